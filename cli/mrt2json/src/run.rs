//! Export logic for ipmeta-mrt2json.

use crate::args::{Cli, Command, CommonArgs};
use anyhow::{Context, Result};
use ipmeta_mrt::{MrtBody, MrtError, MrtMessage};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufWriter::new(std::io::stdout())))
    } else {
        let file = File::create(path)
            .with_context(|| format!("unable to open output file {}", path.display()))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn open_input(args: &CommonArgs) -> Result<File> {
    File::open(&args.input_file)
        .with_context(|| format!("unable to open input file {}", args.input_file.display()))
}

/// Shape one raw message for export; `None` for messages with no payload
/// worth emitting (GEO_PEER_TABLE).
fn raw_value(message: &MrtMessage) -> Result<Option<Value>, MrtError> {
    match &message.body {
        MrtBody::PeerIndexTable(table) => {
            let mut value = serde_json::to_value(table)
                .map_err(|e| MrtError::Malformed(e.to_string()))?;
            value["type"] = json!("peer_index_table");
            Ok(Some(value))
        }
        MrtBody::Rib(rib) => Ok(Some(json!({
            "sub_type": rib.subtype.name(),
            "sequence_number": rib.sequence_number,
            "afi": rib.afi,
            "safi": rib.safi,
            "prefix": rib.prefix,
            "entries": serde_json::to_value(&rib.entries)
                .map_err(|e| MrtError::Malformed(e.to_string()))?,
        }))),
        MrtBody::GeoPeerTable => Ok(None),
    }
}

fn raw(args: &CommonArgs) -> Result<()> {
    let input = open_input(args)?;
    let mut out = open_output(&args.output_file)?;

    ipmeta_mrt::read_messages(input, |message| {
        if let Some(value) = raw_value(&message)? {
            let line = serde_json::to_string(&value)
                .map_err(|e| MrtError::Malformed(e.to_string()))?;
            writeln!(out, "{line}").map_err(MrtError::Io)?;
        }
        Ok(())
    })
    .with_context(|| format!("error processing {}", args.input_file.display()))?;

    out.flush()?;
    Ok(())
}

fn entries(args: &CommonArgs) -> Result<()> {
    let input = open_input(args)?;
    let mut out = open_output(&args.output_file)?;

    ipmeta_mrt::read_rib_entries(input, |entry| {
        let line =
            serde_json::to_string(&entry).map_err(|e| MrtError::Malformed(e.to_string()))?;
        writeln!(out, "{line}").map_err(MrtError::Io)?;
        Ok(())
    })
    .with_context(|| format!("error processing {}", args.input_file.display()))?;

    out.flush()?;
    Ok(())
}

/// Run the selected export.
pub fn execute(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Raw(args) => raw(args),
        Command::Entries(args) => entries(args),
    }
}
