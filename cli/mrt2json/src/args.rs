//! CLI argument definitions for ipmeta-mrt2json.

use clap::{Args, Parser, Subcommand};
use ipmeta_cli_common::LogLevel;
use std::path::PathBuf;

/// Export MRT TABLE_DUMPv2 snapshots as newline-delimited JSON.
#[derive(Parser, Debug)]
#[command(name = "ipmeta-mrt2json")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// One object per MRT message, all attributes preserved
    Raw(CommonArgs),
    /// One object per flattened RIB entry
    Entries(CommonArgs),
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Raw(args) | Command::Entries(args) => args,
        }
    }
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the MRT file
    #[arg(short = 'i', long)]
    pub input_file: PathBuf,

    /// Output file; `-` writes standard output
    #[arg(short = 'o', long, default_value = "-")]
    pub output_file: PathBuf,

    /// Redirect logs to a file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,
}
