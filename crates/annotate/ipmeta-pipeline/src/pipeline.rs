//! The staged pipeline executor.

use crate::codec::{decode_line, encode_record};
use crate::stats::{PipelineStats, StatsSnapshot};
use ipmeta_annotators::{Annotator, AnnotatorFactory};
use ipmeta_error::IpmetaError;
use ipmeta_types::{CodecConfig, IpRecord};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input path; `None` or `-` reads standard input.
    pub input: Option<PathBuf>,

    /// Output path; `None` or `-` writes standard output.
    pub output: Option<PathBuf>,

    /// Record framing and field names.
    pub codec: CodecConfig,

    /// Decoder pool size.
    pub decode_workers: usize,

    /// Encoder pool size.
    pub encode_workers: usize,

    /// Capacity of each bounded queue.
    pub channel_capacity: usize,
}

impl PipelineConfig {
    pub fn new(codec: CodecConfig) -> Self {
        Self {
            input: None,
            output: None,
            codec,
            decode_workers: 5,
            encode_workers: 5,
            channel_capacity: 100,
        }
    }
}

fn is_stdio(path: &Option<PathBuf>) -> bool {
    match path {
        None => true,
        Some(path) => path.as_os_str() == "-" || path.as_os_str().is_empty(),
    }
}

/// Fan a channel out to a pool of per-worker bounded queues.
///
/// A router task distributes items round-robin; a full worker queue blocks
/// the router, which is the intended backpressure. When the inbound channel
/// closes the router drops every sender and the pool drains to completion.
fn fan_out<T: Send + 'static>(
    mut rx: mpsc::Receiver<T>,
    workers: usize,
    capacity: usize,
) -> Vec<mpsc::Receiver<T>> {
    let mut senders = Vec::with_capacity(workers);
    let mut receivers = Vec::with_capacity(workers);
    for _ in 0..workers {
        let (tx, worker_rx) = mpsc::channel(capacity);
        senders.push(tx);
        receivers.push(worker_rx);
    }

    tokio::spawn(async move {
        let mut next = 0usize;
        while let Some(item) = rx.recv().await {
            if senders[next % senders.len()].send(item).await.is_err() {
                break;
            }
            next += 1;
        }
    });

    receivers
}

async fn read_lines(
    input: Option<PathBuf>,
    tx: mpsc::Sender<String>,
    stats: Arc<PipelineStats>,
) -> Result<(), IpmetaError> {
    let reader: Pin<Box<dyn AsyncBufRead + Send>> = if is_stdio(&input) {
        debug!("reading input from stdin");
        Box::pin(BufReader::new(tokio::io::stdin()))
    } else {
        let path = input.as_deref().unwrap_or_else(|| std::path::Path::new("-"));
        debug!(path = %path.display(), "reading input");
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            IpmetaError::Config(format!("unable to open input file {}: {e}", path.display()))
        })?;
        Box::pin(BufReader::new(file))
    };

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        stats.record_read();
        if tx.send(line).await.is_err() {
            break;
        }
    }
    debug!("reader finished");
    Ok(())
}

async fn decode_worker(
    codec: Arc<CodecConfig>,
    mut rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<IpRecord>,
    errors: mpsc::Sender<IpmetaError>,
) {
    while let Some(line) = rx.recv().await {
        match decode_line(&codec, &line) {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                let _ = errors.try_send(error.into());
                return;
            }
        }
    }
}

async fn annotate_worker(
    stage: &'static str,
    id: usize,
    mut annotator: Box<dyn Annotator>,
    mut rx: mpsc::Receiver<IpRecord>,
    tx: mpsc::Sender<IpRecord>,
    errors: mpsc::Sender<IpmetaError>,
) {
    debug!(stage, worker = id, "annotator worker started");
    if let Err(error) = annotator.initialize().await {
        let _ = errors.try_send(error.into());
        return;
    }

    while let Some(mut record) = rx.recv().await {
        let value = annotator.annotate(record.ip).await;
        record.annotate(annotator.field_name(), value);
        if tx.send(record).await.is_err() {
            break;
        }
    }

    if let Err(error) = annotator.close().await {
        warn!(stage, worker = id, %error, "annotator close failed");
    }
    debug!(stage, worker = id, "annotator worker finished");
}

async fn encode_worker(
    codec: Arc<CodecConfig>,
    mut rx: mpsc::Receiver<IpRecord>,
    tx: mpsc::Sender<String>,
    errors: mpsc::Sender<IpmetaError>,
) {
    while let Some(record) = rx.recv().await {
        match encode_record(&codec, record) {
            Ok(line) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                let _ = errors.try_send(error.into());
                return;
            }
        }
    }
}

async fn write_lines(
    output: Option<PathBuf>,
    mut rx: mpsc::Receiver<String>,
    stats: Arc<PipelineStats>,
) -> Result<(), IpmetaError> {
    let writer: Pin<Box<dyn AsyncWrite + Send>> = if is_stdio(&output) {
        Box::pin(tokio::io::stdout())
    } else {
        let path = output.as_deref().unwrap_or_else(|| std::path::Path::new("-"));
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            IpmetaError::Config(format!(
                "unable to open output file {}: {e}",
                path.display()
            ))
        })?;
        Box::pin(file)
    };
    let mut writer = BufWriter::new(writer);

    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        stats.record_written();
    }
    writer.flush().await?;
    debug!("writer finished");
    Ok(())
}

/// Run the pipeline to completion.
///
/// Factories must already be initialized; only enabled ones become stages,
/// in the order given. Returns after the writer has drained on clean EOF,
/// or with the first fatal error (input malformation, annotator
/// initialization failure, I/O failure).
pub async fn run(
    config: &PipelineConfig,
    factories: &[Box<dyn AnnotatorFactory>],
) -> Result<StatsSnapshot, IpmetaError> {
    let stats = Arc::new(PipelineStats::new());
    let capacity = config.channel_capacity.max(1);
    let codec = Arc::new(config.codec.clone());

    // Fatal errors from any worker land here and abort the run.
    let (error_tx, mut error_rx) = mpsc::channel::<IpmetaError>(1);

    // Reader.
    let (line_tx, line_rx) = mpsc::channel::<String>(capacity);
    {
        let input = config.input.clone();
        let stats = stats.clone();
        let errors = error_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = read_lines(input, line_tx, stats).await {
                let _ = errors.try_send(error);
            }
        });
    }

    // Decoder pool.
    let (record_tx, record_rx) = mpsc::channel::<IpRecord>(capacity);
    for rx in fan_out(line_rx, config.decode_workers.max(1), capacity) {
        let codec = codec.clone();
        let tx = record_tx.clone();
        let errors = error_tx.clone();
        tokio::spawn(decode_worker(codec, rx, tx, errors));
    }
    drop(record_tx);

    // One pool per enabled annotator, in registration order.
    let mut stage_rx = record_rx;
    for factory in factories.iter().filter(|factory| factory.is_enabled()) {
        let workers = factory.worker_count().max(1);
        debug!(annotator = factory.name(), workers, "starting annotator stage");

        let (next_tx, next_rx) = mpsc::channel::<IpRecord>(capacity);
        for (id, rx) in fan_out(stage_rx, workers, capacity).into_iter().enumerate() {
            let annotator = factory.make_worker(id);
            let tx = next_tx.clone();
            let errors = error_tx.clone();
            tokio::spawn(annotate_worker(factory.name(), id, annotator, rx, tx, errors));
        }
        drop(next_tx);
        stage_rx = next_rx;
    }

    // Encoder pool.
    let (out_tx, out_rx) = mpsc::channel::<String>(capacity);
    for rx in fan_out(stage_rx, config.encode_workers.max(1), capacity) {
        let codec = codec.clone();
        let tx = out_tx.clone();
        let errors = error_tx.clone();
        tokio::spawn(encode_worker(codec, rx, tx, errors));
    }
    drop(out_tx);

    // Writer.
    let mut writer = {
        let output = config.output.clone();
        let stats = stats.clone();
        tokio::spawn(write_lines(output, out_rx, stats))
    };
    drop(error_tx);

    tokio::select! {
        result = &mut writer => {
            result.map_err(|e| IpmetaError::Config(format!("writer task failed: {e}")))??;
        }
        Some(error) = error_rx.recv() => {
            return Err(error);
        }
    }

    // A worker may have failed in the same instant the writer drained.
    if let Ok(error) = error_rx.try_recv() {
        return Err(error);
    }

    Ok(stats.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ipmeta_error::AnnotateError;
    use ipmeta_types::InputFormat;
    use serde_json::{json, Value};
    use std::io::Write;
    use std::net::IpAddr;
    use tempfile::NamedTempFile;

    struct TagFactory {
        workers: usize,
    }

    struct TagAnnotator;

    #[async_trait]
    impl Annotator for TagAnnotator {
        fn field_name(&self) -> &'static str {
            "tagger"
        }

        async fn annotate(&mut self, ip: IpAddr) -> Value {
            json!({ "seen": ip.to_string() })
        }
    }

    #[async_trait]
    impl AnnotatorFactory for TagFactory {
        fn name(&self) -> &'static str {
            "tagger"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn worker_count(&self) -> usize {
            self.workers
        }

        async fn initialize(&mut self) -> Result<(), AnnotateError> {
            Ok(())
        }

        fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
            Box::new(TagAnnotator)
        }
    }

    struct FailingFactory;

    struct FailingAnnotator;

    #[async_trait]
    impl Annotator for FailingAnnotator {
        fn field_name(&self) -> &'static str {
            "failing"
        }

        async fn initialize(&mut self) -> Result<(), AnnotateError> {
            Err(AnnotateError::Config("broken worker".to_string()))
        }

        async fn annotate(&mut self, _ip: IpAddr) -> Value {
            Value::Null
        }
    }

    #[async_trait]
    impl AnnotatorFactory for FailingFactory {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn worker_count(&self) -> usize {
            1
        }

        async fn initialize(&mut self) -> Result<(), AnnotateError> {
            Ok(())
        }

        fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
            Box::new(FailingAnnotator)
        }
    }

    fn write_input(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn test_config(input: &NamedTempFile, output: &NamedTempFile, format: InputFormat) -> PipelineConfig {
        let mut config = PipelineConfig::new(CodecConfig::new(format));
        config.input = Some(input.path().to_path_buf());
        config.output = Some(output.path().to_path_buf());
        config.decode_workers = 2;
        config.encode_workers = 2;
        config.channel_capacity = 8;
        config
    }

    fn read_output(output: &NamedTempFile) -> Vec<Value> {
        std::fs::read_to_string(output.path())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_bare_pipeline_with_annotator() {
        let input = write_input(&["1.1.1.1", "8.8.8.8", "192.0.2.7"]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Ips);

        let factories: Vec<Box<dyn AnnotatorFactory>> =
            vec![Box::new(TagFactory { workers: 3 })];
        let stats = run(&config, &factories).await.unwrap();

        assert_eq!(stats.records_read, 3);
        assert_eq!(stats.records_written, 3);

        let mut records = read_output(&output);
        assert_eq!(records.len(), 3);
        records.sort_by_key(|r| r["ip"].as_str().unwrap().to_string());

        for record in &records {
            let ip = record["ip"].as_str().unwrap();
            assert_eq!(record["tagger"]["seen"], ip);
        }
        let ips: Vec<_> = records
            .iter()
            .map(|r| r["ip"].as_str().unwrap())
            .collect();
        assert_eq!(ips, vec!["1.1.1.1", "192.0.2.7", "8.8.8.8"]);
    }

    #[tokio::test]
    async fn test_structured_round_trip_without_annotators() {
        let input = write_input(&[r#"{"ip":"192.0.2.7","tag":"x","n":3}"#]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Json);

        let factories: Vec<Box<dyn AnnotatorFactory>> = Vec::new();
        let stats = run(&config, &factories).await.unwrap();
        assert_eq!(stats.records_written, 1);

        let records = read_output(&output);
        assert_eq!(
            records[0],
            json!({"ip":"192.0.2.7","tag":"x","n":3})
        );
    }

    #[tokio::test]
    async fn test_structured_with_annotator_keeps_existing_fields() {
        let input = write_input(&[r#"{"ip":"2606:4700:4700::1111","tag":"x"}"#]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Json);

        let factories: Vec<Box<dyn AnnotatorFactory>> =
            vec![Box::new(TagFactory { workers: 1 })];
        run(&config, &factories).await.unwrap();

        let records = read_output(&output);
        assert_eq!(records[0]["tag"], "x");
        assert_eq!(records[0]["tagger"]["seen"], "2606:4700:4700::1111");
    }

    #[tokio::test]
    async fn test_empty_lines_skipped() {
        let input = write_input(&["1.1.1.1", "", "   ", "8.8.8.8"]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Ips);

        let stats = run(&config, &Vec::new()).await.unwrap();
        assert_eq!(stats.records_read, 2);
        assert_eq!(stats.records_written, 2);
    }

    #[tokio::test]
    async fn test_invalid_ip_is_fatal() {
        let input = write_input(&["1.1.1.1", "not-an-ip"]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Ips);

        let result = run(&config, &Vec::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_annotation_field_in_input_is_fatal() {
        let input = write_input(&[r#"{"ip":"1.2.3.4","zannotate":{}}"#]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Json);

        let result = run(&config, &Vec::new()).await;
        assert!(matches!(
            result,
            Err(IpmetaError::Codec(
                ipmeta_error::CodecError::AnnotationFieldPresent { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_missing_ip_field_is_fatal() {
        let input = write_input(&[r#"{"tag":"x"}"#]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Json);

        assert!(run(&config, &Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_annotator_init_failure_is_fatal() {
        let input = write_input(&["1.1.1.1"]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Ips);

        let factories: Vec<Box<dyn AnnotatorFactory>> = vec![Box::new(FailingFactory)];
        let result = run(&config, &factories).await;
        assert!(matches!(result, Err(IpmetaError::Annotate(_))));
    }

    #[tokio::test]
    async fn test_missing_input_file_is_fatal() {
        let output = NamedTempFile::new().unwrap();
        let mut config = PipelineConfig::new(CodecConfig::new(InputFormat::Ips));
        config.input = Some(PathBuf::from("/nonexistent/input.txt"));
        config.output = Some(output.path().to_path_buf());

        assert!(run(&config, &Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_factories_are_skipped() {
        struct DisabledFactory;

        #[async_trait]
        impl AnnotatorFactory for DisabledFactory {
            fn name(&self) -> &'static str {
                "disabled"
            }
            fn is_enabled(&self) -> bool {
                false
            }
            fn worker_count(&self) -> usize {
                1
            }
            async fn initialize(&mut self) -> Result<(), AnnotateError> {
                Ok(())
            }
            fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
                Box::new(TagAnnotator)
            }
        }

        let input = write_input(&["1.1.1.1"]);
        let output = NamedTempFile::new().unwrap();
        let config = test_config(&input, &output, InputFormat::Ips);

        let factories: Vec<Box<dyn AnnotatorFactory>> = vec![Box::new(DisabledFactory)];
        run(&config, &factories).await.unwrap();

        let records = read_output(&output);
        assert_eq!(records[0], json!({"ip": "1.1.1.1"}));
    }

    #[tokio::test]
    async fn test_many_records_all_arrive() {
        let lines: Vec<String> = (0..500).map(|i| format!("10.0.{}.{}", i / 250, i % 250)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let input = write_input(&refs);
        let output = NamedTempFile::new().unwrap();
        let mut config = test_config(&input, &output, InputFormat::Ips);
        config.channel_capacity = 4; // force backpressure

        let factories: Vec<Box<dyn AnnotatorFactory>> =
            vec![Box::new(TagFactory { workers: 4 })];
        let stats = run(&config, &factories).await.unwrap();

        assert_eq!(stats.records_read, 500);
        assert_eq!(stats.records_written, 500);
        assert_eq!(read_output(&output).len(), 500);
    }
}
