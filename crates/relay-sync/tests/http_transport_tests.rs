use std::sync::Arc;
use std::time::Duration;

use relay_core::{
    AuthoritySource, CoreError, PersonId, RequestId, SnapshotPublisher, StepResultEvent,
    StepResultReporter, StepSnapshot, StepStatus, WorkflowSnapshot,
};
use relay_monitoring::SyncMetrics;
use relay_sync::http::{IN_PROGRESS_PATH, RESULTS_PATH, SNAPSHOTS_PATH};
use relay_sync::{HttpAuthoritySource, HttpSnapshotPublisher, HttpStepResultReporter, HttpSyncClient, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_backoff_ms: 1, backoff_multiplier: 1.0, max_backoff_ms: 1 }
}

fn client(server: &MockServer, retry: RetryPolicy, metrics: Arc<SyncMetrics>) -> HttpSyncClient {
    HttpSyncClient::new(server.uri(), Duration::from_millis(300), retry, metrics).unwrap()
}

fn snapshot() -> WorkflowSnapshot {
    WorkflowSnapshot {
        request_id: RequestId(12),
        requester_id: PersonId(1),
        title: "Conference".to_string(),
        content: "Berlin".to_string(),
        steps: vec![
            StepSnapshot { step_number: 1, approver_id: PersonId(2), status: StepStatus::Approved },
            StepSnapshot { step_number: 2, approver_id: PersonId(3), status: StepStatus::Pending },
        ],
        version: 2,
    }
}

fn decision() -> StepResultEvent {
    StepResultEvent {
        request_id: RequestId(12),
        step_number: 2,
        approver_id: PersonId(3),
        status: StepStatus::Rejected,
        comment: Some("over budget".to_string()),
    }
}

#[tokio::test]
async fn test_snapshot_is_posted_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SNAPSHOTS_PATH))
        .and(body_partial_json(json!({"requestId": 12, "version": 2})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let metrics = Arc::new(SyncMetrics::new());
    let publisher = HttpSnapshotPublisher::new(client(&server, RetryPolicy::none(), metrics.clone()));
    publisher.push_snapshot(snapshot()).await.unwrap();
    assert_eq!(metrics.snapshot().pushes_ok, 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_partial_json(json!({"status": "rejected", "stepNumber": 2})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let metrics = Arc::new(SyncMetrics::new());
    let reporter = HttpStepResultReporter::new(client(&server, fast_retry(3), metrics.clone()));
    reporter.report_step_result(decision()).await.unwrap();

    let counters = metrics.snapshot();
    assert_eq!(counters.retries, 1);
    assert_eq!(counters.reports_ok, 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad status"))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = HttpStepResultReporter::new(client(&server, fast_retry(3), Arc::default()));
    let err = reporter.report_step_result(decision()).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_missing_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("Approval request not found: 12"))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = HttpStepResultReporter::new(client(&server, fast_retry(3), Arc::default()));
    let err = reporter.report_step_result(decision()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    assert_eq!(err.kind(), relay_core::ErrorKind::NotFound);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_slow_receiver_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SNAPSHOTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let publisher = HttpSnapshotPublisher::new(client(&server, RetryPolicy::none(), Arc::default()));
    let err = publisher.push_snapshot(snapshot()).await.unwrap_err();
    assert_eq!(err, CoreError::Timeout(300));
}

#[tokio::test]
async fn test_unreachable_receiver_is_transient() {
    let unreachable = HttpSyncClient::new(
        "http://127.0.0.1:9",
        Duration::from_millis(300),
        RetryPolicy::none(),
        Arc::default(),
    )
    .unwrap();

    let err = HttpSnapshotPublisher::new(unreachable).push_snapshot(snapshot()).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_in_progress_pull_parses_snapshots() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(IN_PROGRESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![snapshot()]))
        .mount(&server)
        .await;

    let source = HttpAuthoritySource::new(client(&server, RetryPolicy::none(), Arc::default()));
    let snapshots = source.fetch_in_progress().await.unwrap();
    assert_eq!(snapshots, vec![snapshot()]);
    assert_eq!(snapshots[0].actionable_approver(), Some(PersonId(3)));
}
