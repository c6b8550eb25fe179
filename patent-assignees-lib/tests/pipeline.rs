// patent-assignees-lib/tests/pipeline.rs

//! End-to-end runs of the fetch pipeline against a mock assignee API.

use patent_assignees_lib::{
    query_filter, AssigneeFetcher, AssigneeRecord, FetchConfig, FetchError, NoopObserver,
    OutputMode, ProgressObserver, ResultWriter,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(server: &MockServer) -> FetchConfig {
    FetchConfig::default()
        .with_endpoint(server.uri())
        .with_throttle_wait(Duration::from_millis(20))
        .with_poll_interval(Duration::from_millis(5))
        .with_request_timeout(Duration::from_secs(5))
}

async fn respond(server: &MockServer, patent_id: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(query_param("q", query_filter(patent_id)))
        .respond_with(template)
        .mount(server)
        .await;
}

fn body(json: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(json.to_string())
}

/// Parse CSV output back into records, skipping the header.
fn rows_of(output: Vec<u8>) -> Vec<AssigneeRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(output.as_slice());
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            AssigneeRecord::new(&r[0], &r[1], &r[2])
        })
        .collect()
}

async fn run_in_memory(
    fetcher: &AssigneeFetcher,
    identifiers: &[&str],
    observer: Arc<dyn ProgressObserver>,
) -> (patent_assignees_lib::RunReport, Vec<AssigneeRecord>) {
    let writer = Arc::new(ResultWriter::from_writer(Vec::new(), true).unwrap());
    let ids = identifiers.iter().map(|s| s.to_string()).collect();

    let report = fetcher.run(ids, writer.clone(), observer).await.unwrap();
    let writer = Arc::try_unwrap(writer).ok().unwrap();
    (report, rows_of(writer.into_inner().unwrap()))
}

#[derive(Default)]
struct RecordingObserver {
    started: AtomicU64,
    completed: Mutex<Vec<String>>,
    throttled: Mutex<Vec<(String, u32)>>,
    abandoned: Mutex<Vec<(String, &'static str)>>,
}

impl ProgressObserver for RecordingObserver {
    fn on_start(&self, total: u64) {
        self.started.store(total, Ordering::SeqCst);
    }

    fn on_completed(&self, identifier: &str, _rows: usize, processed: u64, total: u64) {
        assert!(processed <= total);
        self.completed.lock().unwrap().push(identifier.to_string());
    }

    fn on_throttled(&self, identifier: &str, attempt: u32) {
        self.throttled
            .lock()
            .unwrap()
            .push((identifier.to_string(), attempt));
    }

    fn on_abandoned(&self, identifier: &str, error: &FetchError) {
        self.abandoned
            .lock()
            .unwrap()
            .push((identifier.to_string(), error.kind()));
    }
}

#[tokio::test]
async fn test_rows_for_assignees_and_empty_list() {
    let server = MockServer::start().await;
    respond(
        &server,
        "P1",
        body(r#"{"assignees":[{"assignee_id":"A1","assignee_organization":"Org1"}]}"#),
    )
    .await;
    respond(&server, "P2", body(r#"{"assignees":[]}"#)).await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let (report, rows) = run_in_memory(&fetcher, &["P1", "P2"], Arc::new(NoopObserver)).await;

    let rows: HashSet<_> = rows.into_iter().collect();
    let expected: HashSet<_> = [
        AssigneeRecord::new("P1", "A1", "Org1"),
        AssigneeRecord::empty("P2"),
    ]
    .into_iter()
    .collect();

    assert_eq!(rows, expected);
    assert_eq!(report.processed, 2);
    assert_eq!(report.rows_written, 2);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_throttled_identifier_recovers_and_restores_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", query_filter("P3")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    respond(
        &server,
        "P3",
        body(r#"{"assignees":[{"assignee_id":"A3","assignee_organization":"Org3"}]}"#),
    )
    .await;

    let config = fast_config(&server).with_replenish_budget(7);
    let fetcher = AssigneeFetcher::with_config(config).unwrap();
    let rate = fetcher.rate_controller();
    let observer = Arc::new(RecordingObserver::default());

    let (report, rows) = run_in_memory(&fetcher, &["P3"], observer.clone()).await;

    assert_eq!(rows, vec![AssigneeRecord::new("P3", "A3", "Org3")]);
    assert_eq!(report.throttle_events, 1);
    assert_eq!(
        observer.throttled.lock().unwrap().as_slice(),
        &[("P3".to_string(), 1)]
    );
    // Drained to 0 by the 429, refilled by the later 200
    assert_eq!(rate.current(), 7);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_hard_failure_does_not_block_others() {
    let server = MockServer::start().await;
    respond(&server, "P4", ResponseTemplate::new(500)).await;
    respond(
        &server,
        "P5",
        body(r#"{"assignees":[{"assignee_id":"A5","assignee_organization":"Org5"}]}"#),
    )
    .await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let (report, rows) = run_in_memory(&fetcher, &["P4", "P5"], observer.clone()).await;

    assert_eq!(rows, vec![AssigneeRecord::new("P5", "A5", "Org5")]);
    assert_eq!(report.processed, 1);
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].identifier, "P4");
    assert_eq!(report.abandoned[0].kind, "status");
    assert!(!report.is_complete());
    assert_eq!(
        observer.abandoned.lock().unwrap().as_slice(),
        &[("P4".to_string(), "status")]
    );
}

#[tokio::test]
async fn test_failure_after_throttle_does_not_stall_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", query_filter("P1")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    respond(&server, "P1", ResponseTemplate::new(500)).await;
    respond(
        &server,
        "P2",
        body(r#"{"assignees":[{"assignee_id":"A2","assignee_organization":"Org2"}]}"#),
    )
    .await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server).with_concurrency(1)).unwrap();
    let rate = fetcher.rate_controller();
    let (report, rows) = tokio::time::timeout(
        Duration::from_secs(5),
        run_in_memory(&fetcher, &["P1", "P2"], Arc::new(NoopObserver)),
    )
    .await
    .expect("run should finish after P1 is abandoned");

    assert_eq!(rows, vec![AssigneeRecord::new("P2", "A2", "Org2")]);
    assert_eq!(report.processed, 1);
    assert_eq!(report.abandoned[0].identifier, "P1");
    assert_eq!(report.abandoned[0].kind, "status");
    assert_eq!(rate.current(), rate.replenish_value());
}

#[tokio::test]
async fn test_throttle_cap_does_not_stall_queue() {
    let server = MockServer::start().await;
    respond(&server, "P1", ResponseTemplate::new(429)).await;
    respond(&server, "P2", body(r#"{"assignees":[]}"#)).await;

    let config = fast_config(&server)
        .with_concurrency(1)
        .with_max_throttle_retries(Some(1));
    let fetcher = AssigneeFetcher::with_config(config).unwrap();
    let (report, rows) = tokio::time::timeout(
        Duration::from_secs(5),
        run_in_memory(&fetcher, &["P1", "P2"], Arc::new(NoopObserver)),
    )
    .await
    .expect("run should finish after P1 hits the throttle cap");

    assert_eq!(rows, vec![AssigneeRecord::empty("P2")]);
    assert_eq!(report.throttle_events, 2);
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].identifier, "P1");
    assert_eq!(report.abandoned[0].kind, "throttled");
}

#[tokio::test]
async fn test_fetch_assignees_through_throttle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", query_filter("P10")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    respond(
        &server,
        "P10",
        body(r#"{"assignees":[{"assignee_id":"A10","assignee_organization":"Org10"}]}"#),
    )
    .await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let records = fetcher.fetch_assignees("P10").await.unwrap();

    assert_eq!(records, vec![AssigneeRecord::new("P10", "A10", "Org10")]);
    assert_eq!(fetcher.rate_controller().current(), 15);
}

#[tokio::test]
async fn test_malformed_element_is_skipped() {
    let server = MockServer::start().await;
    respond(
        &server,
        "P6",
        body(r#"{"assignees":["not-an-object",{"assignee_id":"A6","assignee_organization":"Org6"}]}"#),
    )
    .await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let (report, rows) = run_in_memory(&fetcher, &["P6"], Arc::new(NoopObserver)).await;

    assert_eq!(rows, vec![AssigneeRecord::new("P6", "A6", "Org6")]);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_missing_assignees_field_writes_placeholder() {
    let server = MockServer::start().await;
    respond(&server, "P7", body(r#"{"count":0}"#)).await;
    respond(&server, "P8", body(r#"{"assignees":null}"#)).await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let (_report, rows) = run_in_memory(&fetcher, &["P7", "P8"], Arc::new(NoopObserver)).await;

    let rows: HashSet<_> = rows.into_iter().collect();
    assert!(rows.contains(&AssigneeRecord::empty("P7")));
    assert!(rows.contains(&AssigneeRecord::empty("P8")));
}

#[tokio::test]
async fn test_output_independent_of_concurrency() {
    let server = MockServer::start().await;
    let ids: Vec<String> = (0..40).map(|i| format!("X{}", i)).collect();
    for (i, id) in ids.iter().enumerate() {
        let assignees: Vec<String> = (0..i % 3)
            .map(|n| format!(r#"{{"assignee_id":"{}-{}","assignee_organization":"Org {}"}}"#, id, n, n))
            .collect();
        respond(
            &server,
            id,
            body(&format!(r#"{{"assignees":[{}]}}"#, assignees.join(","))),
        )
        .await;
    }
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let serial = AssigneeFetcher::with_config(fast_config(&server).with_concurrency(1)).unwrap();
    let parallel = AssigneeFetcher::with_config(fast_config(&server).with_concurrency(16)).unwrap();

    let (serial_report, serial_rows) =
        run_in_memory(&serial, &id_refs, Arc::new(NoopObserver)).await;
    let (parallel_report, parallel_rows) =
        run_in_memory(&parallel, &id_refs, Arc::new(NoopObserver)).await;

    // 40 identifiers with 0, 1, 2 assignees in rotation; zero becomes one placeholder
    let expected_rows = (0..40).map(|i| (i % 3).max(1)).sum::<usize>();
    assert_eq!(serial_rows.len(), expected_rows);

    let mut serial_sorted = serial_rows;
    let mut parallel_sorted = parallel_rows;
    serial_sorted.sort_by(|a, b| (&a.patent_id, &a.assignee_id).cmp(&(&b.patent_id, &b.assignee_id)));
    parallel_sorted.sort_by(|a, b| (&a.patent_id, &a.assignee_id).cmp(&(&b.patent_id, &b.assignee_id)));
    assert_eq!(serial_sorted, parallel_sorted);

    assert_eq!(serial_report.processed, 40);
    assert_eq!(parallel_report.processed, 40);
}

#[tokio::test]
async fn test_observer_sees_every_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(body(r#"{"assignees":[]}"#))
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..25).map(|i| format!("N{}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let fetcher = AssigneeFetcher::with_config(fast_config(&server).with_concurrency(5)).unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let (report, _rows) = run_in_memory(&fetcher, &id_refs, observer.clone()).await;

    assert_eq!(observer.started.load(Ordering::SeqCst), 25);
    let completed: HashSet<String> = observer.completed.lock().unwrap().iter().cloned().collect();
    assert_eq!(completed, ids.iter().cloned().collect());
    assert_eq!(report.processed, report.total);
}

#[tokio::test]
async fn test_run_files_end_to_end() {
    let server = MockServer::start().await;
    respond(
        &server,
        "10000001",
        body(r#"{"assignees":[{"assignee_id":"A1","assignee_organization":"Acme, Inc."}]}"#),
    )
    .await;
    respond(&server, "10000002", body(r#"{"assignees":[]}"#)).await;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ids.txt");
    let output = dir.path().join("mapping.csv");
    std::fs::write(&input, "# sample\n10000001\n\n10000002\n").unwrap();

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let report = fetcher
        .run_files(&input, &output, OutputMode::Create, Arc::new(NoopObserver))
        .await
        .unwrap();
    assert_eq!(report.total, 2);
    assert!(report.is_complete());

    let content = std::fs::read_to_string(&output).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.remove(0), "patent_id,assignee_id,assignee_organization");
    lines.sort();
    assert_eq!(lines, vec!["10000001,A1,\"Acme, Inc.\"", "10000002,,"]);
}

#[tokio::test]
async fn test_fetch_assignees_single() {
    let server = MockServer::start().await;
    respond(
        &server,
        "P9",
        body(r#"{"assignees":[{"assignee_id":"A9"},{"assignee_organization":"Org9b"}]}"#),
    )
    .await;

    let fetcher = AssigneeFetcher::with_config(fast_config(&server)).unwrap();
    let records = fetcher.fetch_assignees("P9").await.unwrap();

    assert_eq!(
        records,
        vec![
            AssigneeRecord::new("P9", "A9", ""),
            AssigneeRecord::new("P9", "", "Org9b"),
        ]
    );
}
