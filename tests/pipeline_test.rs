use httpmock::prelude::*;
use refund_recon::core::{Loader, Orchestrator, OrchestratorSettings, PollSettings, StagingStore};
use refund_recon::domain::model::{BatchState, FieldWhitelists, TargetMonth};
use refund_recon::{HttpWarehouse, LocalBlobStore, ReconError};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const MARCH_CSV: &str = "\
order_id,provider,date,amount,country
S-100,Stripe,20240301,12.34,GB
P-200,paypal,20240315,0.5,FR
S-101,stripe,20240331,-3.10,GB
";

fn month() -> TargetMonth {
    "202403".parse().unwrap()
}

fn orchestrator(root: &TempDir, server: &MockServer) -> Orchestrator<LocalBlobStore, HttpWarehouse> {
    let store = LocalBlobStore::new(root.path(), "refunds");
    let warehouse = HttpWarehouse::new(server.url(""), "finance").with_access_token("secret");
    let poll = PollSettings {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        timeout: Some(Duration::from_secs(5)),
    };
    let settings = OrchestratorSettings::new(FieldWhitelists::new(["stripe", "paypal"], ["GB", "FR"]));

    Orchestrator::new(
        StagingStore::new(store, "tmp/"),
        Loader::new(warehouse, poll),
        settings,
    )
}

#[tokio::test]
async fn test_submit_confirm_load_against_http_warehouse() {
    let root = TempDir::new().unwrap();
    let server = MockServer::start();

    let insert = server.mock(|when, then| {
        when.method(POST)
            .path("/projects/finance/jobs")
            .header("authorization", "Bearer secret")
            .json_body_partial(
                json!({
                    "configuration": {"load": {
                        "sourceUris": ["gs://refunds/refund_payments_202403.csv"],
                        "destinationTable": {"datasetId": "archive", "tableId": "refund_payments_202403"}
                    }}
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "jobReference": {"projectId": "finance", "jobId": "job_march"},
            "status": {"state": "PENDING"}
        }));
    });
    let poll = server.mock(|when, then| {
        when.method(GET).path("/projects/finance/jobs/job_march");
        then.status(200).json_body(json!({
            "jobReference": {"jobId": "job_march"},
            "status": {"state": "DONE"},
            "statistics": {"load": {"outputRows": "3"}}
        }));
    });

    let orchestrator = orchestrator(&root, &server);

    // Submit: staged under tmp/ with canonical content
    let preview = orchestrator
        .submit("march.csv", MARCH_CSV.as_bytes(), month())
        .await
        .unwrap();
    assert_eq!(preview.row_count, 3);
    assert_eq!(preview.state, BatchState::Staged);
    assert_eq!(preview.uri, "gs://refunds/tmp/refund_payments_202403.csv");

    let staged = std::fs::read_to_string(root.path().join("tmp/refund_payments_202403.csv")).unwrap();
    assert_eq!(
        staged,
        "provider,order_id,date,amount,country\n\
         stripe,S-100,2024-03-01,1234,GB\n\
         paypal,P-200,2024-03-15,50,FR\n\
         stripe,S-101,2024-03-31,-310,GB\n"
    );
    insert.assert_hits(0);

    // Confirm: renamed out of tmp/ and loaded
    let summary = orchestrator.confirm(month()).await.unwrap();
    insert.assert_hits(1);
    poll.assert_hits(1);
    assert_eq!(summary.table.to_string(), "archive.refund_payments_202403");
    assert_eq!(summary.rows_loaded, Some(3));
    assert!(!root.path().join("tmp/refund_payments_202403.csv").exists());
    assert!(root.path().join("refund_payments_202403.csv").is_file());
    assert_eq!(orchestrator.state(month()).await, Some(BatchState::Loaded));

    // A loaded month cannot be confirmed again and the warehouse is left alone
    let err = orchestrator.confirm(month()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconError::InvalidTransition { from: BatchState::Loaded, .. }
    ));
    insert.assert_hits(1);
}

#[tokio::test]
async fn test_failed_load_then_retry_from_fresh_process() {
    let root = TempDir::new().unwrap();
    let server = MockServer::start();

    let mut insert = server.mock(|when, then| {
        when.method(POST).path("/projects/finance/jobs");
        then.status(200)
            .json_body(json!({"jobReference": {"jobId": "job_bad"}}));
    });
    let mut failed = server.mock(|when, then| {
        when.method(GET).path("/projects/finance/jobs/job_bad");
        then.status(200).json_body(json!({
            "jobReference": {"jobId": "job_bad"},
            "status": {"state": "DONE", "errorResult": {"message": "Quota exceeded"}}
        }));
    });

    let first = orchestrator(&root, &server);
    first.submit("march.csv", MARCH_CSV.as_bytes(), month()).await.unwrap();
    let err = first.confirm(month()).await.unwrap_err();
    assert!(matches!(err, ReconError::Load { ref message, .. } if message.contains("Quota exceeded")));
    assert_eq!(first.state(month()).await, Some(BatchState::Confirmed));
    assert!(root.path().join("refund_payments_202403.csv").is_file());

    insert.delete();
    failed.delete();
    server.mock(|when, then| {
        when.method(POST).path("/projects/finance/jobs");
        then.status(200)
            .json_body(json!({"jobReference": {"jobId": "job_good"}}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/projects/finance/jobs/job_good");
        then.status(200).json_body(json!({
            "jobReference": {"jobId": "job_good"},
            "status": {"state": "DONE"}
        }));
    });

    // A new orchestrator has no ledger entry but finds the confirmed artifact
    let second = orchestrator(&root, &server);
    let summary = second.retry_load(month()).await.unwrap();
    assert_eq!(summary.job_id, "job_good");
    assert_eq!(second.state(month()).await, Some(BatchState::Loaded));
}

#[tokio::test]
async fn test_rejected_submission_leaves_store_empty() {
    let root = TempDir::new().unwrap();
    let server = MockServer::start();
    let orchestrator = orchestrator(&root, &server);

    let csv = "order_id,provider,date,amount,country\nV-1,venmo,20240301,1.00,GB\nS-1,stripe,20240229,1.00,US\n";
    let err = orchestrator.submit("march.csv", csv.as_bytes(), month()).await.unwrap_err();

    let ReconError::Rejected(report) = err else {
        panic!("expected a rejection");
    };
    assert!(report.unknown_providers.contains("venmo"));
    assert!(report.unknown_countries.contains("US"));
    assert_eq!(report.out_of_window.len(), 1);

    let message = report.to_string();
    assert!(message.contains("venmo"));
    assert!(message.contains("202403"));

    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cancel_discards_every_staged_month() {
    let root = TempDir::new().unwrap();
    let server = MockServer::start();
    let orchestrator = orchestrator(&root, &server);

    let february = "order_id,provider,date,amount,country\nS-9,stripe,20240210,9.99,GB\n";
    orchestrator.submit("march.csv", MARCH_CSV.as_bytes(), month()).await.unwrap();
    orchestrator
        .submit("february.csv", february.as_bytes(), "202402".parse().unwrap())
        .await
        .unwrap();

    let deleted = orchestrator.cancel().await.unwrap();
    assert_eq!(
        deleted,
        vec!["tmp/refund_payments_202402.csv", "tmp/refund_payments_202403.csv"]
    );
    assert_eq!(orchestrator.state(month()).await, Some(BatchState::Cancelled));

    let err = orchestrator.confirm(month()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconError::InvalidTransition { from: BatchState::Cancelled, .. }
    ));
}
