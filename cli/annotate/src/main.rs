//! ipmeta-annotate CLI
//!
//! Streaming IP metadata annotation.

use clap::Parser;
use ipmeta_cli_common::{format_number, init_logging};

mod args;
mod run;

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Logs go to stderr (or --log-file) so stdout stays clean for records.
    init_logging(args.log_level, args.log_file.as_deref())?;

    let stats = run::execute(args).await?;

    eprintln!();
    eprintln!("Annotation completed:");
    eprintln!("  Records read:     {}", format_number(stats.records_read));
    eprintln!("  Records written:  {}", format_number(stats.records_written));

    let secs = stats.duration_secs();
    eprintln!("  Duration:         {:.2}s", secs);
    if secs > 0.0 && stats.records_written > 0 {
        eprintln!(
            "  Throughput:       {} records/sec",
            format_number((stats.records_written as f64 / secs) as u64)
        );
    }

    Ok(())
}
