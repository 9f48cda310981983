use crate::core::loader::Loader;
use crate::core::normalizer::{ExcessPrecisionPolicy, Normalizer};
use crate::core::source::RawSpreadsheet;
use crate::core::staging::StagingStore;
use crate::core::validator::validate;
use crate::domain::model::{
    BatchState, ConfirmedArtifact, FieldWhitelists, LoadSummary, PreviewResult, TableId,
    TargetMonth,
};
use crate::domain::ports::{BlobStore, Warehouse};
use crate::utils::error::{ReconError, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub const DEFAULT_DATASET: &str = "archive";
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub whitelists: FieldWhitelists,
    pub excess_precision: ExcessPrecisionPolicy,
    pub preview_rows: usize,
    pub project: Option<String>,
    pub dataset: String,
}

impl OrchestratorSettings {
    pub fn new(whitelists: FieldWhitelists) -> Self {
        Self {
            whitelists,
            excess_precision: ExcessPrecisionPolicy::default(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            project: None,
            dataset: DEFAULT_DATASET.to_string(),
        }
    }
}

/// Drives submissions through normalize → validate → stage → confirm → load.
///
/// The orchestrator remembers the last known state of every target month it
/// has handled. The blob store stays authoritative for what is staged, so a
/// month staged by another process can still be confirmed here.
pub struct Orchestrator<S: BlobStore, W: Warehouse> {
    normalizer: Normalizer,
    whitelists: FieldWhitelists,
    staging: StagingStore<S>,
    loader: Loader<W>,
    preview_rows: usize,
    project: Option<String>,
    dataset: String,
    ledger: Mutex<HashMap<TargetMonth, BatchState>>,
}

impl<S: BlobStore, W: Warehouse> Orchestrator<S, W> {
    pub fn new(staging: StagingStore<S>, loader: Loader<W>, settings: OrchestratorSettings) -> Self {
        Self {
            normalizer: Normalizer::new(settings.excess_precision),
            whitelists: settings.whitelists,
            staging,
            loader,
            preview_rows: settings.preview_rows,
            project: settings.project,
            dataset: settings.dataset,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub async fn state(&self, month: TargetMonth) -> Option<BatchState> {
        self.ledger.lock().await.get(&month).copied()
    }

    async fn record(&self, month: TargetMonth, state: BatchState) {
        tracing::debug!("Batch {} -> {}", month, state);
        self.ledger.lock().await.insert(month, state);
    }

    /// 讀取上傳檔案後交給 [`Self::submit_spreadsheet`]
    pub async fn submit(&self, filename: &str, bytes: &[u8], month: TargetMonth) -> Result<PreviewResult> {
        tracing::info!("📥 Received {} ({} bytes) for {}", filename, bytes.len(), month);
        match RawSpreadsheet::from_upload(filename, bytes) {
            Ok(raw) => self.submit_spreadsheet(&raw, month).await,
            Err(e) => {
                self.record(month, BatchState::Received).await;
                self.reject(month).await;
                Err(e.into())
            }
        }
    }

    pub async fn submit_spreadsheet(&self, raw: &RawSpreadsheet, month: TargetMonth) -> Result<PreviewResult> {
        // 新的提交取代同月份先前的批次
        self.record(month, BatchState::Received).await;

        let row_set = match self.normalizer.normalize(raw) {
            Ok(row_set) => row_set,
            Err(e) => {
                tracing::warn!("Normalization failed for {}: {}", month, e);
                self.reject(month).await;
                return Err(e.into());
            }
        };

        let batch = match validate(&row_set, month, &self.whitelists) {
            Ok(batch) => batch,
            Err(report) => {
                self.reject(month).await;
                return Err(ReconError::Rejected(report));
            }
        };
        self.record(month, batch.state()).await;

        let artifact = self.staging.stage(&batch).await?;
        let batch = batch.advance(BatchState::Staged)?;
        self.record(month, batch.state()).await;

        Ok(PreviewResult {
            target_month: month,
            row_count: batch.len(),
            rows: batch.rows().iter().take(self.preview_rows).cloned().collect(),
            bucket: artifact.bucket,
            key: artifact.key,
            uri: artifact.uri,
            state: batch.state(),
        })
    }

    async fn reject(&self, month: TargetMonth) {
        // RECEIVED -> REJECTED 永遠合法
        self.record(month, BatchState::Rejected).await;

        // 被取代的舊暫存檔不可再被確認
        match self.staging.discard(month).await {
            Ok(true) => tracing::info!("🗑️ Discarded earlier staged artifact for rejected {}", month),
            Ok(false) => {}
            Err(e) => tracing::warn!("⚠️ Could not discard staged artifact for {}: {}", month, e),
        }
    }

    /// Promotes the staged artifact and loads it.
    ///
    /// Only a STAGED month can be confirmed. A month this orchestrator has
    /// not seen falls back to the blob store, which stays authoritative.
    /// After a failed load the month is CONFIRMED and only
    /// [`Self::retry_load`] can make progress.
    pub async fn confirm(&self, month: TargetMonth) -> Result<LoadSummary> {
        if let Some(state) = self.state(month).await {
            state.transition(BatchState::Confirmed)?;
        }

        let artifact = self.staging.confirm(month).await?;
        self.record(month, BatchState::Confirmed).await;

        self.load_confirmed(month, &artifact).await
    }

    /// Re-runs only the load of an already confirmed month.
    pub async fn retry_load(&self, month: TargetMonth) -> Result<LoadSummary> {
        match self.state(month).await {
            Some(BatchState::Confirmed) | None => {}
            Some(other) => {
                return Err(ReconError::InvalidTransition {
                    from: other,
                    to: BatchState::Loaded,
                })
            }
        }

        let artifact = self
            .staging
            .confirmed(month)
            .await?
            .ok_or_else(|| ReconError::NoConfirmedArtifact {
                target_month: month,
                key: self.staging.confirmed_key(month),
            })?;
        self.record(month, BatchState::Confirmed).await;

        self.load_confirmed(month, &artifact).await
    }

    async fn load_confirmed(&self, month: TargetMonth, artifact: &ConfirmedArtifact) -> Result<LoadSummary> {
        let table = TableId::for_artifact(self.project.as_deref(), &self.dataset, artifact);
        match self.loader.load(artifact, &table).await {
            Ok(summary) => {
                self.record(month, BatchState::Confirmed.transition(BatchState::Loaded)?)
                    .await;
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("❌ Load for {} failed, artifact stays confirmed: {}", month, e);
                Err(e)
            }
        }
    }

    /// Deletes everything under the staging prefix, including artifacts
    /// staged by other submitters, and marks staged months CANCELLED.
    ///
    /// A month whose staged artifact could not be deleted stays STAGED, and
    /// the failed keys are reported as a storage error.
    pub async fn cancel(&self) -> Result<Vec<String>> {
        let outcome = self.staging.cancel().await?;

        let mut ledger = self.ledger.lock().await;
        for (month, state) in ledger.iter_mut() {
            let key = self.staging.staged_key(*month);
            if *state == BatchState::Staged && outcome.failed_keys().all(|failed| failed != key) {
                *state = state.transition(BatchState::Cancelled)?;
                tracing::debug!("Batch {} -> {}", month, state);
            }
        }
        drop(ledger);

        tracing::info!("🗑️ Cancelled staging: {} artifact(s) deleted", outcome.deleted.len());
        if outcome.is_complete() {
            return Ok(outcome.deleted);
        }

        let message = outcome
            .failed
            .iter()
            .map(|(key, message)| format!("{}: {}", key, message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ReconError::Storage {
            key: outcome.failed_keys().collect::<Vec<_>>().join(", "),
            message: format!(
                "cancel left {} staged artifact(s) behind ({} deleted): {}",
                outcome.failed.len(),
                outcome.deleted.len(),
                message
            ),
        })
    }
}
