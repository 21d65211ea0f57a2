use super::*;
use crate::codec::JsonDecoder;
use crate::message::Message;
use crate::pipeline::{PipelineConfig, ReaderSource, RunReport, StageError, WriterSink};
use crate::stages::{MapContext, MapStage};
use rand::Rng;
use std::io::Cursor;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ID_SCHEMA: &str = r#"{"id": "int", "name": "string"}"#;

fn user_line(i: usize) -> String {
    format!(r#"{{"id": {i}, "name": "user{i}"}}"#)
}

fn bad_line(i: usize) -> String {
    format!(r#"{{"id": "bad-{i}", "name": "user{i}"}}"#)
}

fn expected_csv(ids: impl IntoIterator<Item = usize>) -> String {
    let mut out = String::from("id,name\n");
    for i in ids {
        out.push_str(&format!("{i},user{i}\n"));
    }
    out
}

async fn run_pipeline(pipeline: Pipeline, lines: &[String]) -> (String, RunReport) {
    let input = lines.join("\n").into_bytes();
    let source = ReaderSource::new(Cursor::new(input));
    let mut sink = WriterSink::new(Vec::new());

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        pipeline.run(source, &mut sink, &CancellationToken::new()),
    )
    .await
    .expect("pipeline did not terminate")
    .unwrap();

    (String::from_utf8(sink.into_inner()).unwrap(), report)
}

async fn convert(settings: &Settings, schema: Option<&str>, lines: &[String]) -> (String, RunReport) {
    let schema = schema.map(|s| Schema::compile(s).unwrap());
    let pipeline = build_pipeline(settings, schema).unwrap();
    run_pipeline(pipeline, lines).await
}

fn halting() -> Settings {
    SettingsBuilder::default().stop_on_error(true).build().unwrap()
}

#[test]
fn test_settings_defaults() {
    let settings = SettingsBuilder::default().build().unwrap();
    assert!(settings.schema_path().is_none());
    assert!(!settings.stop_on_error());
    assert!(!settings.forward_mismatched());
    assert!(settings.show_header());
    assert_eq!(settings.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
}

#[test]
fn test_stages_depend_on_schema_and_stop() {
    let plain = build_pipeline(&Settings::default(), None).unwrap();
    assert_eq!(
        plain.stage_names(),
        ["json-decode", "header-discovery", "to-csv"]
    );

    // Stopping needs a schema to have any effect.
    let stop_only = build_pipeline(&halting(), None).unwrap();
    assert_eq!(stop_only.len(), 3);

    let schema = Schema::compile(ID_SCHEMA).unwrap();
    let validating = build_pipeline(&Settings::default(), Some(schema.clone())).unwrap();
    assert_eq!(
        validating.stage_names(),
        ["json-decode", "schema-gate", "header-discovery", "to-csv"]
    );

    let stopping = build_pipeline(&halting(), Some(schema)).unwrap();
    assert_eq!(
        stopping.stage_names(),
        ["json-decode", "schema-gate", "cancel-guard", "header-discovery", "to-csv"]
    );
}

#[test]
fn test_zero_queue_capacity_is_a_config_error() {
    let settings = SettingsBuilder::default().queue_capacity(0usize).build().unwrap();
    assert!(matches!(
        build_pipeline(&settings, None),
        Err(ConfigError::Pipeline(_))
    ));
}

#[tokio::test]
async fn test_valid_records_produce_header_and_rows_in_order() {
    let lines: Vec<_> = (1..=200).map(user_line).collect();

    let (csv, report) = convert(&Settings::default(), None, &lines).await;

    assert_eq!(csv, expected_csv(1..=200));
    assert_eq!(report.messages_written, 201);
    assert!(!report.has_errors());
}

#[tokio::test]
async fn test_empty_input_produces_nothing() {
    let (csv, report) = convert(&Settings::default(), None, &[]).await;
    assert!(csv.is_empty());
    assert_eq!(report.messages_written, 0);
    assert!(!report.has_errors());

    let (csv, _) = convert(&halting(), Some(ID_SCHEMA), &[]).await;
    assert!(csv.is_empty());
}

#[tokio::test]
async fn test_halt_on_first_mismatch() {
    let k = 4;
    let lines: Vec<_> = (1..=50)
        .map(|i| if i == k { bad_line(i) } else { user_line(i) })
        .collect();

    let (csv, report) = convert(&halting(), Some(ID_SCHEMA), &lines).await;

    let rows: Vec<&str> = csv.lines().collect();
    assert!(rows.len() <= k, "got {} lines", rows.len());
    if let Some((header, data)) = rows.split_first() {
        assert_eq!(*header, "id,name");
        for (n, row) in data.iter().enumerate() {
            assert_eq!(*row, format!("{},user{}", n + 1, n + 1));
        }
    }
    assert!(report.cancelled);
    assert_eq!(report.cancellation_reports(), 1);
    let mismatches = report
        .errors
        .iter()
        .filter(|r| matches!(r.error, StageError::SchemaMismatch(_)))
        .count();
    assert_eq!(mismatches, 1);
}

#[tokio::test]
async fn test_halt_when_last_record_mismatches() {
    let lines = vec![user_line(1), user_line(2), bad_line(3)];

    let (csv, report) = convert(&halting(), Some(ID_SCHEMA), &lines).await;

    assert!(csv.lines().count() <= 3);
    assert_eq!(report.cancellation_reports(), 1);
}

#[tokio::test]
async fn test_mismatches_dropped_without_halting() {
    let lines: Vec<_> = (1..=10)
        .map(|i| if i == 3 || i == 7 { bad_line(i) } else { user_line(i) })
        .collect();

    let (csv, report) = convert(&Settings::default(), Some(ID_SCHEMA), &lines).await;

    assert_eq!(csv, expected_csv([1, 2, 4, 5, 6, 8, 9, 10]));
    assert!(!report.cancelled);
    assert_eq!(report.cancellation_reports(), 0);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|r| r.stage == "schema-gate"));
}

#[tokio::test]
async fn test_mismatches_forwarded_when_configured() {
    let settings = SettingsBuilder::default()
        .forward_mismatched(true)
        .build()
        .unwrap();
    let lines = vec![user_line(1), bad_line(2), user_line(3)];

    let (csv, report) = convert(&settings, Some(ID_SCHEMA), &lines).await;

    assert_eq!(csv, "id,name\n1,user1\nbad-2,user2\n3,user3\n");
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_decode_errors_do_not_stop_stream() {
    let lines = vec![
        user_line(1),
        "{not json".to_string(),
        "[1, 2]".to_string(),
        user_line(2),
    ];

    let (csv, report) = convert(&Settings::default(), None, &lines).await;

    assert_eq!(csv, expected_csv([1, 2]));
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|r| r.stage == "json-decode"));
}

#[tokio::test]
async fn test_header_comes_from_first_surviving_record() {
    let lines = vec![
        r#"{"id": "nope", "junk": 1}"#.to_string(),
        r#"{"name": "b", "id": 2}"#.to_string(),
        r#"{"id": 3, "name": "c", "extra": true}"#.to_string(),
    ];

    let (csv, _) = convert(&Settings::default(), Some(ID_SCHEMA), &lines).await;

    assert_eq!(csv, "name,id\nb,2\nc,3\n");
}

#[tokio::test]
async fn test_empty_first_record_does_not_fix_header() {
    let lines = vec!["{}".to_string(), user_line(1), user_line(2)];

    let (csv, report) = convert(&Settings::default(), None, &lines).await;

    assert_eq!(csv, "id,name\n,\n1,user1\n2,user2\n");
    assert!(!report.has_errors());
}

#[tokio::test]
async fn test_no_header_setting() {
    let settings = SettingsBuilder::default().show_header(false).build().unwrap();
    let (csv, _) = convert(&settings, None, &[user_line(1)]).await;
    assert_eq!(csv, "1,user1\n");
}

// Builds the full validating chain with a randomly slowed stage in front.
fn jittery_pipeline(slow_decode: bool) -> Pipeline {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    let jitter = MapStage::from_fn("jitter", |_ctx: &MapContext, message: Message| async move {
        let micros = rand::thread_rng().gen_range(0..300u64);
        tokio::time::sleep(Duration::from_micros(micros)).await;
        Ok(message)
    });

    if slow_decode {
        pipeline.add(jitter);
        pipeline.add(JsonDecoder.into_stage());
    } else {
        pipeline.add(JsonDecoder.into_stage());
        pipeline.add(jitter);
    }
    let schema = Arc::new(Schema::compile(ID_SCHEMA).unwrap());
    pipeline.add(SchemaGate::new(schema).halt_on_mismatch(true).into_stage());
    pipeline.add(CancelGuard::new());

    let header = SharedHeader::new();
    pipeline.add(HeaderDiscovery::new(header.clone()).into_stage());
    pipeline.add(LazyStage::new("to-csv", move || {
        Box::new(CsvEncoder::new(header.clone())) as Box<dyn Stage>
    }));
    pipeline
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_match_reference() {
    let lines: Vec<_> = (1..=150).map(user_line).collect();
    let reference = expected_csv(1..=150);

    let runs = (0..8).map(|n| {
        let lines = lines.clone();
        tokio::spawn(async move { run_pipeline(jittery_pipeline(n % 2 == 0), &lines).await })
    });
    let results = futures::future::join_all(runs).await;

    for result in results {
        let (csv, report) = result.unwrap();
        assert_eq!(csv, reference);
        assert!(!report.has_errors());
    }
}

#[tokio::test]
async fn test_load_schema_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    std::fs::write(&path, ID_SCHEMA).unwrap();

    let schema = load_schema(&path).await.unwrap();
    assert_eq!(schema, Schema::compile(ID_SCHEMA).unwrap());

    let settings = SettingsBuilder::default()
        .schema_path(path)
        .stop_on_error(true)
        .build()
        .unwrap();
    let pipeline = prepare(&settings).await.unwrap();
    assert_eq!(pipeline.len(), 5);
}

#[tokio::test]
async fn test_schema_load_failures_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        load_schema(&missing).await,
        Err(ConfigError::ReadSchema { .. })
    ));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, r#"{"id": "integer"}"#).unwrap();
    let err = load_schema(&broken).await.unwrap_err();
    assert!(matches!(err, ConfigError::Schema(SchemaError::Invalid { .. })));
}
