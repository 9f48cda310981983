use crate::domain::model::{Batch, ConfirmedArtifact, Row, StagingArtifact, TargetMonth, CANONICAL_COLUMNS};
use crate::domain::ports::BlobStore;
use crate::utils::error::{ReconError, Result};

pub const DEFAULT_STAGING_PREFIX: &str = "tmp/";

const ARTIFACT_STEM: &str = "refund_payments";

/// Serializes rows as `provider,order_id,date,amount,country`, dates as
/// `YYYY-MM-DD` and amounts as integer minor units.
pub fn to_canonical_csv(rows: &[Row]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CANONICAL_COLUMNS)?;
    for row in rows {
        let date = row.date.format("%Y-%m-%d").to_string();
        let amount = row.amount_minor_units.to_string();
        writer.write_record([
            row.provider.as_str(),
            row.order_id.as_str(),
            date.as_str(),
            amount.as_str(),
            row.country.as_str(),
        ])?;
    }
    writer.into_inner().map_err(|e| ReconError::Io(e.into_error()))
}

/// 取消結果：成功刪除的鍵與刪除失敗的鍵（附錯誤訊息）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl CancelOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|(key, _)| key.as_str())
    }
}

/// Per-month artifact lifecycle on top of a blob store.
pub struct StagingStore<S: BlobStore> {
    store: S,
    prefix: String,
}

impl<S: BlobStore> StagingStore<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if prefix.is_empty() {
            prefix = DEFAULT_STAGING_PREFIX.to_string();
        } else if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { store, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn confirmed_key(&self, month: TargetMonth) -> String {
        format!("{}_{}.csv", ARTIFACT_STEM, month)
    }

    pub fn staged_key(&self, month: TargetMonth) -> String {
        format!("{}{}", self.prefix, self.confirmed_key(month))
    }

    /// 覆寫同月份既有的暫存檔（後寫者勝）
    pub async fn stage(&self, batch: &Batch) -> Result<StagingArtifact> {
        let month = batch.target_month();
        let key = self.staged_key(month);
        let content = to_canonical_csv(batch.rows())?;

        self.store.put(&key, &content, "text/csv").await?;
        tracing::info!("📤 Staged {} row(s) for {} at {}", batch.len(), month, key);

        Ok(StagingArtifact {
            bucket: self.store.bucket().to_string(),
            uri: self.store.uri(&key),
            key,
            target_month: month,
            content,
        })
    }

    /// Moves the staged artifact to its confirmed name.
    ///
    /// Destructive: the staged copy is gone afterwards, so a second call for
    /// the same month fails with `NoStagedArtifact`.
    pub async fn confirm(&self, month: TargetMonth) -> Result<ConfirmedArtifact> {
        let staged = self.staged_key(month);
        let confirmed = self.confirmed_key(month);

        if !self.store.rename(&staged, &confirmed).await? {
            return Err(ReconError::NoStagedArtifact {
                target_month: month,
                key: staged,
            });
        }
        tracing::info!("✅ Blob {} has been renamed to {}", staged, confirmed);

        Ok(self.confirmed_artifact(month, confirmed))
    }

    /// Deletes every object under the staging prefix.
    ///
    /// Not scoped to a month or a submitter: artifacts staged concurrently by
    /// anyone else are deleted too. Every key is attempted even when some
    /// deletes fail; only a failed listing is returned as an error.
    pub async fn cancel(&self) -> Result<CancelOutcome> {
        let keys = self.store.list(&self.prefix).await?;
        let mut outcome = CancelOutcome::default();
        for key in keys {
            match self.store.delete(&key).await {
                Ok(()) => {
                    tracing::info!("🗑️ Blob {} deleted", key);
                    outcome.deleted.push(key);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Could not delete {}: {}", key, e);
                    outcome.failed.push((key, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }

    /// 刪除單一月份的暫存檔；不存在時回傳 `false`
    pub async fn discard(&self, month: TargetMonth) -> Result<bool> {
        let key = self.staged_key(month);
        if !self.store.exists(&key).await? {
            return Ok(false);
        }
        self.store.delete(&key).await?;
        tracing::info!("🗑️ Blob {} deleted", key);
        Ok(true)
    }

    /// 查詢已確認的檔案，用於重試載入
    pub async fn confirmed(&self, month: TargetMonth) -> Result<Option<ConfirmedArtifact>> {
        let key = self.confirmed_key(month);
        if self.store.exists(&key).await? {
            Ok(Some(self.confirmed_artifact(month, key)))
        } else {
            Ok(None)
        }
    }

    fn confirmed_artifact(&self, month: TargetMonth, key: String) -> ConfirmedArtifact {
        ConfirmedArtifact {
            bucket: self.store.bucket().to_string(),
            uri: self.store.uri(&key),
            key,
            target_month: month,
        }
    }
}
