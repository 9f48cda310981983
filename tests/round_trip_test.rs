use refund_recon::adapters::storage::MemoryBlobStore;
use refund_recon::core::{validate, Normalizer, RawSheet, RawSpreadsheet, SourceLayout, StagingStore};
use refund_recon::domain::model::{FieldWhitelists, TargetMonth};
use refund_recon::domain::ports::BlobStore;

fn whitelists() -> FieldWhitelists {
    FieldWhitelists::new(["stripe", "paypal", "adyen"], ["GB", "FR", "DE"])
}

fn submission() -> RawSpreadsheet {
    let headers: Vec<String> = ["Order_ID", " Date ", "AMOUNT", "country"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let row = |cells: [&str; 4]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();

    RawSpreadsheet {
        sheets: vec![
            RawSheet {
                label: Some("Stripe".into()),
                headers: headers.clone(),
                rows: vec![
                    row(["S-1", "20240301", "12.34", "GB"]),
                    row(["S-2", "20240302.0", "7", "DE"]),
                ],
            },
            RawSheet {
                label: Some("Adyen".into()),
                headers,
                rows: vec![row(["A-1", "20240331", "-0.99", "FR"])],
            },
        ],
        layout: SourceLayout::Submission,
    }
}

#[tokio::test]
async fn test_staged_artifact_normalizes_back_to_the_same_batch() {
    let month: TargetMonth = "202403".parse().unwrap();
    let store = MemoryBlobStore::new("refunds");
    let staging = StagingStore::new(store.clone(), "tmp/");

    let rows = Normalizer::default().normalize(&submission()).unwrap();
    let batch = validate(&rows, month, &whitelists()).unwrap();
    let artifact = staging.stage(&batch).await.unwrap();

    let stored = store.get(&artifact.key).await.unwrap();
    let reread = RawSpreadsheet::from_canonical_csv(&stored).unwrap();
    let rows_again = Normalizer::default().normalize(&reread).unwrap();
    let batch_again = validate(&rows_again, month, &whitelists()).unwrap();

    assert_eq!(batch_again.rows(), batch.rows());
    assert_eq!(batch.rows()[0].provider, "stripe");
    assert_eq!(batch.rows()[1].amount_minor_units, 700);
    assert_eq!(batch.rows()[2].provider, "adyen");
    assert_eq!(batch.rows()[2].amount_minor_units, -99);
}

#[tokio::test]
async fn test_restaging_the_same_batch_is_idempotent() {
    let month: TargetMonth = "202403".parse().unwrap();
    let store = MemoryBlobStore::new("refunds");
    let staging = StagingStore::new(store.clone(), "tmp/");

    let rows = Normalizer::default().normalize(&submission()).unwrap();
    let batch = validate(&rows, month, &whitelists()).unwrap();

    let first = staging.stage(&batch).await.unwrap();
    let second = staging.stage(&batch).await.unwrap();

    assert_eq!(first.content, second.content);
    assert_eq!(store.keys().await, vec!["tmp/refund_payments_202403.csv"]);
}
