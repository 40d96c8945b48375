use super::command::Command;
use crate::error::{OrderError, Result};
use std::io::BufRead;

/// Reads commands from a JSON-lines source.
///
/// Blank lines and lines starting with `#` are skipped. Each item carries
/// its 1-based line number so the caller can report a bad line and move on.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses one command per line.
    pub fn commands(self) -> impl Iterator<Item = (usize, Result<Command>)> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line_no = index + 1;
                match line {
                    Err(e) => Some((line_no, Err(OrderError::from(e)))),
                    Ok(text) => {
                        let text = text.trim();
                        if text.is_empty() || text.starts_with('#') {
                            None
                        } else {
                            Some((line_no, serde_json::from_str(text).map_err(OrderError::from)))
                        }
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::ActorId;

    #[test]
    fn test_reader_skips_comments_and_reports_line_numbers() {
        let data = r#"# fund the buyer
{"cmd":"top_up","actor":"b1","amount":50000,"reference":"trf-1"}

{"cmd":"launch_rocket"}
{"cmd":"sweep"}
"#;
        let results: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(results.len(), 3);
        let (line, first) = &results[0];
        assert_eq!(*line, 2);
        assert_eq!(
            first.as_ref().unwrap(),
            &Command::TopUp {
                actor: ActorId::new("b1"),
                amount: 50_000,
                reference: "trf-1".to_string(),
            }
        );
        assert_eq!(results[1].0, 4);
        assert!(results[1].1.is_err());
        assert!(matches!(results[2].1, Ok(Command::Sweep)));
    }

    #[test]
    fn test_checkout_parses_nested_cart() {
        let data = r#"{"cmd":"checkout","order":"o1","cart":{"buyer_id":"b1","voucher_code":"HEMAT","items":[{"product_id":"p1","seller_id":"s1","name":"Sepatu","unit_price":50000,"quantity":1,"category":"physical","voucher":{"code":"HEMAT","amount":5000}}]}}"#;
        let mut results = CommandReader::new(data.as_bytes()).commands();
        let (_, command) = results.next().unwrap();

        let Command::Checkout { order, cart } = command.unwrap() else {
            panic!("expected checkout");
        };
        assert_eq!(order, "o1");
        assert_eq!(cart.items.len(), 1);
        assert!(cart.items[0].selected);
        assert_eq!(cart.items[0].voucher.as_ref().unwrap().amount, 5_000);
    }
}
