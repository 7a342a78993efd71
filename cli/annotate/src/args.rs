//! CLI argument definitions for ipmeta-annotate.

use clap::{Parser, ValueEnum};
use ipmeta_cli_common::LogLevel;
use std::path::PathBuf;

/// Annotate a stream of IP addresses with metadata.
///
/// Reads newline-delimited input (bare IPs or JSON objects carrying an IP
/// field), runs each record through the enabled annotators, and writes one
/// JSON object per record.
///
/// ## Examples
///
/// ASN annotation of a bare IP list:
///   ipmeta-annotate --geoasn --geoasn-database GeoLite2-ASN.mmdb -i ips.txt
///
/// Routing annotation of JSON records from stdin:
///   ipmeta-annotate --input-file-type json --routing --routing-mrt-file rib.mrt
#[derive(Parser, Debug)]
#[command(name = "ipmeta-annotate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    // === Input / Output ===
    /// Input file; `-` reads standard input
    #[arg(short = 'i', long, default_value = "-")]
    pub input_file: PathBuf,

    /// Input framing
    #[arg(long, value_enum, default_value = "ips")]
    pub input_file_type: InputType,

    /// Output file; `-` writes standard output
    #[arg(short = 'o', long, default_value = "-")]
    pub output_file: PathBuf,

    /// Where to save JSON run metadata
    #[arg(long)]
    pub metadata_file: Option<PathBuf>,

    /// Redirect logs to a file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    // === Processing ===
    /// Number of record-decoding workers (must be >= 1)
    #[arg(long, default_value = "5", value_parser = parse_positive_usize)]
    pub decode_threads: usize,

    /// Number of record-encoding workers (must be >= 1)
    #[arg(long, default_value = "5", value_parser = parse_positive_usize)]
    pub encode_threads: usize,

    /// Capacity of each inter-stage queue (must be >= 1)
    #[arg(long, default_value = "100", value_parser = parse_positive_usize)]
    pub channel_buffer: usize,

    // === JSON input fields ===
    /// Key in JSON input that contains the IP address
    #[arg(long, default_value = "ip")]
    pub json_ip_field: String,

    /// Reserved annotation key; input records carrying it are rejected
    #[arg(long, default_value = "zannotate")]
    pub json_annotation_field: String,

    // === MaxMind GeoIP2 ===
    /// Annotate with MaxMind GeoIP2/GeoLite2 City data
    #[arg(long)]
    pub geoip2: bool,

    /// Path to the GeoIP2 City database
    #[arg(long)]
    pub geoip2_database: Option<PathBuf>,

    /// How to open the database: mmap or memory
    #[arg(long, default_value = "mmap")]
    pub geoip2_mode: String,

    /// Language for localized names
    #[arg(long, default_value = "en")]
    pub geoip2_language: String,

    /// `*` or a comma-separated subset of: city, country, continent,
    /// postal, latlong, traits, subdivisions, registered_country,
    /// represented_country
    #[arg(long, default_value = "*")]
    pub geoip2_fields: String,

    /// GeoIP2 worker count
    #[arg(long, default_value = "5", value_parser = parse_positive_usize)]
    pub geoip2_threads: usize,

    // === MaxMind GeoLite ASN ===
    /// Annotate with MaxMind GeoLite ASN data
    #[arg(long)]
    pub geoasn: bool,

    /// Path to the GeoLite ASN database
    #[arg(long)]
    pub geoasn_database: Option<PathBuf>,

    /// GeoASN worker count
    #[arg(long, default_value = "5", value_parser = parse_positive_usize)]
    pub geoasn_threads: usize,

    // === IPInfo ===
    /// Annotate with IPInfo.io data
    #[arg(long)]
    pub ipinfo: bool,

    /// Path to the IPInfo MMDB file
    #[arg(long)]
    pub ipinfo_database: Option<PathBuf>,

    /// IPInfo worker count
    #[arg(long, default_value = "1", value_parser = parse_positive_usize)]
    pub ipinfo_threads: usize,

    // === BGP routing ===
    /// Annotate with origin-AS routing lookups
    #[arg(long)]
    pub routing: bool,

    /// Path to an MRT TABLE_DUMPv2 snapshot
    #[arg(long)]
    pub routing_mrt_file: Option<PathBuf>,

    /// Path to an AS-names file (one JSON object per line)
    #[arg(long)]
    pub routing_as_names: Option<PathBuf>,

    /// Path to an AS-data file (one JSON object per line)
    #[arg(long)]
    pub routing_as_data: Option<PathBuf>,

    /// Collapse private-ASN path segments into this origin ASN
    #[arg(long)]
    pub routing_local_asn: Option<u32>,

    /// Routing worker count
    #[arg(long, default_value = "5", value_parser = parse_positive_usize)]
    pub routing_threads: usize,

    // === Reverse DNS ===
    /// Annotate with reverse-DNS (PTR) lookups
    #[arg(long)]
    pub rdns: bool,

    /// Comma-separated resolver IPs; empty uses system defaults
    #[arg(long, default_value = "")]
    pub rdns_dns_servers: String,

    /// Per-query timeout in seconds
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..))]
    pub rdns_timeout: u64,

    /// Reverse-DNS worker count
    #[arg(long, default_value = "100", value_parser = parse_positive_usize)]
    pub rdns_threads: usize,

    // === RDAP ===
    /// Annotate with RDAP (successor to WHOIS) lookups
    #[arg(long)]
    pub rdap: bool,

    /// RDAP query timeout in seconds
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..))]
    pub rdap_timeout: u64,

    /// RDAP worker count
    #[arg(long, default_value = "5", value_parser = parse_positive_usize)]
    pub rdap_threads: usize,

    // === Spur ===
    /// Enrich with Spur context data (token from SPUR_API_KEY)
    #[arg(long)]
    pub spur: bool,

    /// Spur query timeout in seconds
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..))]
    pub spur_timeout: u64,

    /// Spur worker count
    #[arg(long, default_value = "100", value_parser = parse_positive_usize)]
    pub spur_threads: usize,
}

/// Input framing.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InputType {
    /// One bare IP literal per line
    Ips,
    /// One JSON object per line
    Json,
}

/// Parse a positive usize (>= 1).
fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value < 1 {
        return Err(format!("{} is not in 1..", value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["ipmeta-annotate"]);
        assert_eq!(cli.json_ip_field, "ip");
        assert_eq!(cli.json_annotation_field, "zannotate");
        assert_eq!(cli.decode_threads, 5);
        assert_eq!(cli.rdns_threads, 100);
        assert!(!cli.geoip2);
    }

    #[test]
    fn test_positive_parser_rejects_zero() {
        assert!(Cli::try_parse_from(["ipmeta-annotate", "--decode-threads", "0"]).is_err());
    }

    #[test]
    fn test_annotator_flags() {
        let cli = Cli::parse_from([
            "ipmeta-annotate",
            "--geoasn",
            "--geoasn-database",
            "asn.mmdb",
            "--routing",
            "--routing-mrt-file",
            "rib.mrt",
            "--routing-local-asn",
            "38",
        ]);
        assert!(cli.geoasn);
        assert!(cli.routing);
        assert_eq!(cli.routing_local_asn, Some(38));
    }
}
