//! ipmeta-mrt2json CLI
//!
//! Standalone MRT TABLE_DUMPv2 → JSON exporter.

use clap::Parser;
use ipmeta_cli_common::init_logging;

mod args;
mod run;

use args::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let common = cli.command.common();
    init_logging(common.log_level, common.log_file.as_deref())?;

    run::execute(cli)
}
