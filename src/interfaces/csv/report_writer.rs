use crate::domain::actor::ActorId;
use crate::domain::money::Balance;
use crate::domain::order::OrderStatus;
use crate::error::{OrderError, Result};
use crate::interfaces::script::runner::OrderRow;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRecord<'a> {
    actor: &'a ActorId,
    balance: Balance,
}

#[derive(Serialize)]
struct OrderRecord<'a> {
    order: &'a str,
    status: OrderStatus,
    total: u64,
    funds_released: bool,
}

/// Writes end-of-run reports as CSV to any `Write` sink (e.g. stdout).
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    /// `actor,balance`, one row per actor in the order given. The header is
    /// written even when there are no rows.
    pub fn write_balances(mut self, balances: &[(ActorId, Balance)]) -> Result<W> {
        self.writer.write_record(["actor", "balance"])?;
        for (actor, balance) in balances {
            self.writer.serialize(BalanceRecord {
                actor,
                balance: *balance,
            })?;
        }
        self.finish()
    }

    /// `order,status,total,funds_released`.
    pub fn write_orders(mut self, rows: &[OrderRow]) -> Result<W> {
        self.writer
            .write_record(["order", "status", "total", "funds_released"])?;
        for row in rows {
            self.writer.serialize(OrderRecord {
                order: &row.name,
                status: row.order.status,
                total: row.order.total_price,
                funds_released: row.order.funds_released,
            })?;
        }
        self.finish()
    }

    fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| OrderError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balances_csv() {
        let balances = vec![
            (ActorId::platform(), Balance::new(2_000)),
            (ActorId::new("s1"), Balance::new(18_000)),
        ];
        let out = ReportWriter::new(Vec::new())
            .write_balances(&balances)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "actor,balance\nplatform,2000\ns1,18000\n"
        );
    }

    #[test]
    fn test_empty_report_keeps_header() {
        let out = ReportWriter::new(Vec::new()).write_balances(&[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "actor,balance\n");
    }
}
