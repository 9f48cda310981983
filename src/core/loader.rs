use crate::domain::model::{ConfirmedArtifact, LoadSummary, TableId};
use crate::domain::ports::{JobStatus, LoadRequest, Warehouse};
use crate::utils::error::{ReconError, Result};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// 呼叫端的等待上限；`None` 表示等到終止狀態為止
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_millis(2000),
            timeout: None,
        }
    }
}

/// Appends confirmed artifacts into the warehouse and waits for the job.
pub struct Loader<W: Warehouse> {
    warehouse: W,
    poll: PollSettings,
}

impl<W: Warehouse> Loader<W> {
    pub fn new(warehouse: W, poll: PollSettings) -> Self {
        Self { warehouse, poll }
    }

    /// Runs one load job to completion. Failures are never retried here.
    pub async fn load(&self, artifact: &ConfirmedArtifact, table: &TableId) -> Result<LoadSummary> {
        let request = LoadRequest::csv_append(artifact.uri.clone(), table.clone());
        let job = self.warehouse.submit_load(&request).await?;
        tracing::info!("🚚 Load job {} submitted: {} -> {}", job.id, artifact.uri, table);

        let started = Instant::now();
        let mut interval = self.poll.initial_interval;

        loop {
            let status = self.warehouse.job_status(&job).await?;
            tracing::debug!("Load job {} status: {:?}", job.id, status);

            match status {
                JobStatus::Done { rows_loaded } => {
                    tracing::info!("✅ File {} written to {}", artifact.uri, table);
                    return Ok(LoadSummary {
                        table: table.clone(),
                        source_uri: artifact.uri.clone(),
                        job_id: job.id,
                        rows_loaded,
                    });
                }
                JobStatus::Failed { message } => {
                    tracing::error!("❌ Load job {} into {} failed: {}", job.id, table, message);
                    return Err(ReconError::Load {
                        table: table.to_string(),
                        job_id: job.id,
                        message,
                    });
                }
                JobStatus::Pending | JobStatus::Running => {}
            }

            let mut pause = interval;
            if let Some(timeout) = self.poll.timeout {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(ReconError::LoadTimeout {
                        table: table.to_string(),
                        job_id: job.id,
                        waited,
                    });
                }
                // 不超過呼叫端的等待上限
                pause = pause.min(timeout - waited);
            }

            tokio::time::sleep(pause).await;
            interval = (interval * 2).min(self.poll.max_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::JobHandle;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Replays a scripted sequence of statuses; the last one repeats.
    #[derive(Clone)]
    struct ScriptedWarehouse {
        statuses: Arc<Mutex<VecDeque<JobStatus>>>,
        requests: Arc<Mutex<Vec<LoadRequest>>>,
        polls: Arc<Mutex<usize>>,
    }

    impl ScriptedWarehouse {
        fn new(statuses: Vec<JobStatus>) -> Self {
            Self {
                statuses: Arc::new(Mutex::new(statuses.into())),
                requests: Arc::new(Mutex::new(Vec::new())),
                polls: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl Warehouse for ScriptedWarehouse {
        async fn submit_load(&self, request: &LoadRequest) -> Result<JobHandle> {
            self.requests.lock().await.push(request.clone());
            Ok(JobHandle {
                id: "job-1".into(),
                location: None,
            })
        }

        async fn job_status(&self, _job: &JobHandle) -> Result<JobStatus> {
            *self.polls.lock().await += 1;
            let mut statuses = self.statuses.lock().await;
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                Ok(statuses.front().cloned().unwrap())
            }
        }
    }

    fn fast_poll() -> PollSettings {
        PollSettings {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            timeout: None,
        }
    }

    fn artifact() -> ConfirmedArtifact {
        ConfirmedArtifact {
            bucket: "refunds".into(),
            key: "refund_payments_202403.csv".into(),
            uri: "gs://refunds/refund_payments_202403.csv".into(),
            target_month: "202403".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_load_waits_for_terminal_success() {
        let warehouse = ScriptedWarehouse::new(vec![
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done { rows_loaded: Some(2) },
        ]);
        let loader = Loader::new(warehouse.clone(), fast_poll());
        let table = TableId::for_artifact(None, "archive", &artifact());

        let summary = loader.load(&artifact(), &table).await.unwrap();

        assert_eq!(summary.table.to_string(), "archive.refund_payments_202403");
        assert_eq!(summary.job_id, "job-1");
        assert_eq!(summary.rows_loaded, Some(2));
        assert_eq!(*warehouse.polls.lock().await, 3);

        let requests = warehouse.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source_uri, "gs://refunds/refund_payments_202403.csv");
        assert_eq!(requests[0].skip_leading_rows, 1);
        assert_eq!(requests[0].schema.len(), 5);
        assert_eq!(requests[0].schema[3].field_type, "FLOAT");
    }

    #[tokio::test]
    async fn test_failed_job_carries_diagnostic() {
        let warehouse = ScriptedWarehouse::new(vec![
            JobStatus::Running,
            JobStatus::Failed {
                message: "CSV table encountered too many errors".into(),
            },
        ]);
        let loader = Loader::new(warehouse.clone(), fast_poll());
        let table = TableId::for_artifact(Some("finance"), "archive", &artifact());

        let err = loader.load(&artifact(), &table).await.unwrap_err();

        match err {
            ReconError::Load { table, job_id, message } => {
                assert_eq!(table, "finance.archive.refund_payments_202403");
                assert_eq!(job_id, "job-1");
                assert!(message.contains("too many errors"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // 不會自動重試
        assert_eq!(warehouse.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_caller_timeout() {
        let warehouse = ScriptedWarehouse::new(vec![JobStatus::Running]);
        let poll = PollSettings {
            timeout: Some(Duration::from_millis(20)),
            ..fast_poll()
        };
        let loader = Loader::new(warehouse, poll);
        let table = TableId::for_artifact(None, "archive", &artifact());

        let err = loader.load(&artifact(), &table).await.unwrap_err();
        assert!(matches!(err, ReconError::LoadTimeout { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_not_overshot_by_long_intervals() {
        let warehouse = ScriptedWarehouse::new(vec![JobStatus::Running]);
        let poll = PollSettings {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(2),
            timeout: Some(Duration::from_millis(50)),
        };
        let loader = Loader::new(warehouse.clone(), poll);
        let table = TableId::for_artifact(None, "archive", &artifact());

        let started = Instant::now();
        let err = loader.load(&artifact(), &table).await.unwrap_err();

        assert!(matches!(err, ReconError::LoadTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
        // one poll before the shortened pause, one after it
        assert_eq!(*warehouse.polls.lock().await, 2);
    }
}
