use chrono::Utc;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use niaga::domain::ports::RepositoryRef;
use niaga::infrastructure::clock::ManualClock;
use niaga::infrastructure::in_memory::InMemoryStore;
use niaga::infrastructure::notifier::TracingNotifier;
use niaga::interfaces::cli::Cli;
use niaga::interfaces::csv::report_writer::ReportWriter;
use niaga::interfaces::script::runner::ScriptRunner;
use niaga::telemetry;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_logger(&cli.log_level);

    let config = cli.policy()?;

    let repo: RepositoryRef = if let Some(db_path) = &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            info!(path = %db_path.display(), "using persistent storage");
            Arc::new(niaga::infrastructure::rocksdb::RocksDBStore::open(db_path)?)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            warn!(
                path = %db_path.display(),
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Arc::new(InMemoryStore::new())
        }
    } else {
        Arc::new(InMemoryStore::new())
    };

    let clock = ManualClock::new(cli.start.unwrap_or_else(Utc::now));
    let mut runner = ScriptRunner::new(repo, Arc::new(TracingNotifier), clock, config);

    let file = File::open(&cli.input).into_diagnostic()?;
    let summary = runner.run(BufReader::new(file)).await;
    info!(
        applied = summary.applied,
        failed = summary.failed,
        "script finished"
    );

    let balances = runner.balances().await?;
    let stdout = io::stdout();
    let mut out = ReportWriter::new(stdout.lock()).write_balances(&balances)?;
    if cli.orders {
        writeln!(out).into_diagnostic()?;
        let rows = runner.order_rows().await?;
        ReportWriter::new(out).write_orders(&rows)?;
    }

    Ok(())
}
