use crate::domain::model::TableId;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Durable object storage addressed by key inside a single bucket.
pub trait BlobStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// 倉儲載入時使用的來源 URI
    fn uri(&self, key: &str) -> String;

    fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    fn exists(&self, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Moves `from` to `to`. Resolves to `false` when `from` does not exist.
    fn rename(
        &self,
        from: &str,
        to: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    fn list(&self, prefix: &str) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;

    /// 刪除不存在的物件不算錯誤
    fn delete(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub field_type: &'static str,
}

/// 月度退款表的固定結構
pub const TARGET_SCHEMA: [SchemaField; 5] = [
    SchemaField { name: "provider", field_type: "STRING" },
    SchemaField { name: "order_id", field_type: "STRING" },
    SchemaField { name: "date", field_type: "DATE" },
    SchemaField { name: "amount", field_type: "FLOAT" },
    SchemaField { name: "country", field_type: "STRING" },
];

/// An append-only CSV load into one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub source_uri: String,
    pub table: TableId,
    pub schema: &'static [SchemaField],
    pub skip_leading_rows: u32,
}

impl LoadRequest {
    pub fn csv_append(source_uri: impl Into<String>, table: TableId) -> Self {
        Self {
            source_uri: source_uri.into(),
            table,
            schema: &TARGET_SCHEMA,
            skip_leading_rows: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done { rows_loaded: Option<u64> },
    Failed { message: String },
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn submit_load(&self, request: &LoadRequest) -> Result<JobHandle>;
    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus>;
}
