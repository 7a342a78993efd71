//! Main execution logic for ipmeta-annotate.

use crate::args::{Cli, InputType};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ipmeta_annotators::{
    AnnotatorFactory, GeoAsnConfig, GeoAsnFactory, GeoIp2Config, GeoIp2Factory, IpinfoConfig,
    IpinfoFactory, MmdbMode, RdapConfig, RdapFactory, RdnsConfig, RdnsFactory,
    RoutingAnnotatorConfig, RoutingFactory, SpurConfig, SpurFactory,
};
use ipmeta_pipeline::{PipelineConfig, StatsSnapshot};
use ipmeta_types::{CodecConfig, InputFormat};
use serde::Serialize;
use tracing::{info, warn};

/// Assemble every annotator factory in registration order.
///
/// Chain order is fixed here; only enabled factories become stages.
fn build_factories(args: &Cli) -> Result<Vec<Box<dyn AnnotatorFactory>>> {
    let geoip2 = GeoIp2Config {
        enabled: args.geoip2,
        database: args.geoip2_database.clone(),
        mode: MmdbMode::parse(&args.geoip2_mode)?,
        language: args.geoip2_language.clone(),
        fields: args.geoip2_fields.clone(),
        workers: args.geoip2_threads,
    };
    let geoasn = GeoAsnConfig {
        enabled: args.geoasn,
        database: args.geoasn_database.clone(),
        workers: args.geoasn_threads,
    };
    let ipinfo = IpinfoConfig {
        enabled: args.ipinfo,
        database: args.ipinfo_database.clone(),
        workers: args.ipinfo_threads,
    };
    let routing = RoutingAnnotatorConfig {
        enabled: args.routing,
        mrt_file: args.routing_mrt_file.clone(),
        as_names: args.routing_as_names.clone(),
        as_data: args.routing_as_data.clone(),
        local_asn: args.routing_local_asn,
        workers: args.routing_threads,
    };
    let rdns = RdnsConfig {
        enabled: args.rdns,
        resolvers: args.rdns_dns_servers.clone(),
        timeout_secs: args.rdns_timeout,
        workers: args.rdns_threads,
    };
    let rdap = RdapConfig {
        enabled: args.rdap,
        timeout_secs: args.rdap_timeout,
        workers: args.rdap_threads,
    };
    let spur = SpurConfig {
        enabled: args.spur,
        timeout_secs: args.spur_timeout,
        workers: args.spur_threads,
    };

    Ok(vec![
        Box::new(GeoIp2Factory::new(geoip2)),
        Box::new(GeoAsnFactory::new(geoasn)),
        Box::new(IpinfoFactory::new(ipinfo)),
        Box::new(RoutingFactory::new(routing)),
        Box::new(RdnsFactory::new(rdns)),
        Box::new(RdapFactory::new(rdap)),
        Box::new(SpurFactory::new(spur)),
    ])
}

/// JSON run metadata written when `--metadata-file` is set.
#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    input_file: String,
    output_file: String,
    annotators: Vec<&'a str>,
    records_read: u64,
    records_written: u64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

/// Execute the pipeline with the provided arguments.
pub async fn execute(args: Cli) -> Result<StatsSnapshot> {
    let format = match args.input_file_type {
        InputType::Ips => InputFormat::Ips,
        InputType::Json => InputFormat::Json,
    };
    let codec = CodecConfig::new(format)
        .with_ip_field(&args.json_ip_field)
        .with_annotation_field(&args.json_annotation_field);

    let mut config = PipelineConfig::new(codec);
    config.input = Some(args.input_file.clone());
    config.output = Some(args.output_file.clone());
    config.decode_workers = args.decode_threads;
    config.encode_workers = args.encode_threads;
    config.channel_capacity = args.channel_buffer;

    let mut factories = build_factories(&args)?;
    if !factories.iter().any(|factory| factory.is_enabled()) {
        bail!("no annotators enabled; nothing to do");
    }

    for factory in factories.iter_mut().filter(|factory| factory.is_enabled()) {
        factory
            .initialize()
            .await
            .with_context(|| format!("failed to initialize {} annotator", factory.name()))?;
        info!(
            annotator = factory.name(),
            workers = factory.worker_count(),
            "annotator enabled"
        );
    }

    let stats = ipmeta_pipeline::run(&config, &factories).await?;

    for factory in factories.iter_mut().filter(|factory| factory.is_enabled()) {
        if let Err(error) = factory.close().await {
            warn!(annotator = factory.name(), %error, "annotator close failed");
        }
    }

    if let Some(path) = &args.metadata_file {
        let metadata = RunMetadata {
            input_file: args.input_file.display().to_string(),
            output_file: args.output_file.display().to_string(),
            annotators: factories
                .iter()
                .filter(|factory| factory.is_enabled())
                .map(|factory| factory.name())
                .collect(),
            records_read: stats.records_read,
            records_written: stats.records_written,
            start_time: stats.started_at,
            end_time: stats.finished_at,
        };
        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(path, json)
            .with_context(|| format!("unable to write metadata file {}", path.display()))?;
    }

    Ok(stats)
}
