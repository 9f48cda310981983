use crate::domain::model::TableId;
use crate::domain::ports::{JobHandle, JobStatus, LoadRequest, Warehouse};
use crate::utils::error::{ReconError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// 與 BigQuery jobs REST API 相容的倉儲用戶端
#[derive(Debug, Clone)]
pub struct HttpWarehouse {
    client: Client,
    endpoint: String,
    project: String,
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsert<'a> {
    job_reference: ProjectRef<'a>,
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRef<'a> {
    project_id: &'a str,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    source_uris: Vec<&'a str>,
    destination_table: TableReference<'a>,
    schema: TableSchema<'a>,
    source_format: &'static str,
    skip_leading_rows: u32,
    write_disposition: &'static str,
    create_disposition: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TableSchema<'a> {
    fields: Vec<FieldSchema<'a>>,
}

#[derive(Debug, Serialize)]
struct FieldSchema<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    field_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobState>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobState {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    // REST API 以字串表示 int64
    #[serde(default)]
    output_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorProto,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{}: {}", reason, message),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

impl JobResource {
    fn into_status(self) -> JobStatus {
        let Some(status) = self.status else {
            return JobStatus::Pending;
        };

        if let Some(error) = status.error_result {
            return JobStatus::Failed {
                message: error.describe(),
            };
        }

        match status.state.as_str() {
            "DONE" => JobStatus::Done {
                rows_loaded: self
                    .statistics
                    .and_then(|s| s.load)
                    .and_then(|l| l.output_rows)
                    .and_then(|rows| rows.parse().ok()),
            },
            "PENDING" => JobStatus::Pending,
            _ => JobStatus::Running,
        }
    }
}

impl HttpWarehouse {
    pub fn new(endpoint: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project: project.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn jobs_url(&self) -> String {
        format!("{}/projects/{}/jobs", self.endpoint, self.project)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn destination<'a>(&'a self, table: &'a TableId) -> TableReference<'a> {
        TableReference {
            project_id: table.project.as_deref().unwrap_or(&self.project),
            dataset_id: &table.dataset,
            table_id: &table.table,
        }
    }

    async fn read_job(response: Response) -> Result<JobResource> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.describe())
                .unwrap_or(body);
            return Err(ReconError::Warehouse {
                message: format!("HTTP {}: {}", status, detail),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Warehouse for HttpWarehouse {
    async fn submit_load(&self, request: &LoadRequest) -> Result<JobHandle> {
        let body = JobInsert {
            job_reference: ProjectRef {
                project_id: &self.project,
            },
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    source_uris: vec![request.source_uri.as_str()],
                    destination_table: self.destination(&request.table),
                    schema: TableSchema {
                        fields: request
                            .schema
                            .iter()
                            .map(|f| FieldSchema {
                                name: f.name,
                                field_type: f.field_type,
                            })
                            .collect(),
                    },
                    source_format: "CSV",
                    skip_leading_rows: request.skip_leading_rows,
                    write_disposition: "WRITE_APPEND",
                    create_disposition: "CREATE_IF_NEEDED",
                },
            },
        };

        tracing::debug!("Submitting load job to {}", self.jobs_url());
        let response = self
            .authorize(self.client.post(self.jobs_url()))
            .json(&body)
            .send()
            .await?;
        let job = Self::read_job(response).await?;

        Ok(JobHandle {
            id: job.job_reference.job_id,
            location: job.job_reference.location,
        })
    }

    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus> {
        let mut request = self.client.get(format!("{}/{}", self.jobs_url(), job.id));
        if let Some(location) = &job.location {
            request = request.query(&[("location", location)]);
        }

        let response = self.authorize(request).send().await?;
        Ok(Self::read_job(response).await?.into_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ConfirmedArtifact;
    use httpmock::prelude::*;
    use serde_json::json;

    fn table() -> TableId {
        let artifact = ConfirmedArtifact {
            bucket: "refunds".into(),
            key: "refund_payments_202403.csv".into(),
            uri: "gs://refunds/refund_payments_202403.csv".into(),
            target_month: "202403".parse().unwrap(),
        };
        TableId::for_artifact(None, "archive", &artifact)
    }

    #[tokio::test]
    async fn test_submit_load_sends_append_configuration() {
        let server = MockServer::start();
        let insert = server.mock(|when, then| {
            when.method(POST)
                .path("/projects/finance/jobs")
                .header("authorization", "Bearer secret")
                .json_body_partial(
                    json!({
                        "configuration": {
                            "load": {
                                "sourceUris": ["gs://refunds/refund_payments_202403.csv"],
                                "destinationTable": {
                                    "projectId": "finance",
                                    "datasetId": "archive",
                                    "tableId": "refund_payments_202403"
                                },
                                "sourceFormat": "CSV",
                                "skipLeadingRows": 1,
                                "writeDisposition": "WRITE_APPEND"
                            }
                        }
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "jobReference": {"projectId": "finance", "jobId": "job_abc", "location": "EU"},
                "status": {"state": "RUNNING"}
            }));
        });

        let warehouse = HttpWarehouse::new(server.url(""), "finance").with_access_token("secret");
        let request = LoadRequest::csv_append("gs://refunds/refund_payments_202403.csv", table());

        let job = warehouse.submit_load(&request).await.unwrap();

        insert.assert();
        assert_eq!(job.id, "job_abc");
        assert_eq!(job.location.as_deref(), Some("EU"));
    }

    #[tokio::test]
    async fn test_schema_fields_are_sent_in_order() {
        let server = MockServer::start();
        let insert = server.mock(|when, then| {
            when.method(POST).path("/projects/finance/jobs").json_body_partial(
                json!({
                    "configuration": {"load": {"schema": {"fields": [
                        {"name": "provider", "type": "STRING"},
                        {"name": "order_id", "type": "STRING"},
                        {"name": "date", "type": "DATE"},
                        {"name": "amount", "type": "FLOAT"},
                        {"name": "country", "type": "STRING"}
                    ]}}}
                })
                .to_string(),
            );
            then.status(200)
                .json_body(json!({"jobReference": {"jobId": "job_1"}}));
        });

        let warehouse = HttpWarehouse::new(server.url("/"), "finance");
        let request = LoadRequest::csv_append("gs://refunds/x.csv", table());
        warehouse.submit_load(&request).await.unwrap();
        insert.assert();
    }

    #[tokio::test]
    async fn test_job_status_maps_states() {
        let server = MockServer::start();
        let done = server.mock(|when, then| {
            when.method(GET)
                .path("/projects/finance/jobs/job_done")
                .query_param("location", "EU");
            then.status(200).json_body(json!({
                "jobReference": {"jobId": "job_done"},
                "status": {"state": "DONE"},
                "statistics": {"load": {"outputRows": "42"}}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/projects/finance/jobs/job_failed");
            then.status(200).json_body(json!({
                "jobReference": {"jobId": "job_failed"},
                "status": {
                    "state": "DONE",
                    "errorResult": {"reason": "invalid", "message": "Could not parse 'abc' as DATE"}
                }
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/projects/finance/jobs/job_pending");
            then.status(200).json_body(json!({
                "jobReference": {"jobId": "job_pending"},
                "status": {"state": "PENDING"}
            }));
        });

        let warehouse = HttpWarehouse::new(server.url(""), "finance");
        let handle = |id: &str, location: Option<&str>| JobHandle {
            id: id.to_string(),
            location: location.map(str::to_string),
        };

        assert_eq!(
            warehouse.job_status(&handle("job_done", Some("EU"))).await.unwrap(),
            JobStatus::Done { rows_loaded: Some(42) }
        );
        done.assert();
        assert_eq!(
            warehouse.job_status(&handle("job_failed", None)).await.unwrap(),
            JobStatus::Failed {
                message: "invalid: Could not parse 'abc' as DATE".into()
            }
        );
        assert_eq!(
            warehouse.job_status(&handle("job_pending", None)).await.unwrap(),
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/projects/finance/jobs");
            then.status(403).json_body(json!({
                "error": {"code": 403, "message": "Access Denied: Project finance"}
            }));
        });

        let warehouse = HttpWarehouse::new(server.url(""), "finance");
        let request = LoadRequest::csv_append("gs://refunds/x.csv", table());
        let err = warehouse.submit_load(&request).await.unwrap_err();

        match err {
            ReconError::Warehouse { message } => {
                assert!(message.contains("403"));
                assert!(message.contains("Access Denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
