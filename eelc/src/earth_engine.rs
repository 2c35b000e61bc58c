//! [`ComputeService`] backed by the Earth Engine REST API.
//!
//! Exports are started with `projects/{project}/image:export`, which returns a
//! long-running operation; its name is the job id and is polled with a plain
//! `GET` on the operation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use eelc_core::contract::{ComputeService, ExportJob, ExportRequest, JobStatus};
use eelc_core::error::ServiceError;

use crate::auth::TokenProvider;
use crate::http::{authorised, send_json};

pub const DEFAULT_BASE_URL: &str = "https://earthengine.googleapis.com";

pub struct EarthEngineClient {
    http: reqwest::Client,
    base_url: String,
    project: String,
    tokens: Arc<TokenProvider>,
}

impl EarthEngineClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenProvider>, project: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            project: project.into(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn export_url(&self) -> String {
        format!("{}/v1/projects/{}/image:export", self.base_url, self.project)
    }

    fn operation_url(&self, name: &str) -> String {
        format!("{}/v1/{}", self.base_url, name.trim_start_matches('/'))
    }
}

/// Request body for `image:export`: a GeoTIFF written to the request's bucket
/// under its key.
pub fn export_body(request: &ExportRequest) -> Value {
    json!({
        "expression": request.expression,
        "description": request.key,
        "fileExportOptions": {
            "fileFormat": "GEO_TIFF",
            "cloudStorageDestination": {
                "bucket": request.bucket,
                "filenamePrefix": request.key,
            },
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub destination_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub message: Option<String>,
}

impl Operation {
    /// Map the operation onto the scheduler's view of a job.
    pub fn job_status(&self) -> JobStatus {
        let state = self
            .metadata
            .as_ref()
            .and_then(|m| m.state.as_deref())
            .unwrap_or("");
        let destination_uri = || {
            self.metadata
                .as_ref()
                .and_then(|m| m.destination_uris.first().cloned())
        };
        let error_message = || {
            self.error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| format!("export {}", state.to_ascii_lowercase()))
        };

        match state {
            "SUCCEEDED" => JobStatus::Completed {
                destination_uri: destination_uri(),
            },
            "FAILED" | "CANCELLED" => JobStatus::Failed {
                error_message: error_message(),
            },
            "RUNNING" | "CANCELLING" => JobStatus::Running,
            _ if self.error.is_some() => JobStatus::Failed {
                error_message: error_message(),
            },
            _ if self.done => JobStatus::Completed {
                destination_uri: destination_uri(),
            },
            _ => JobStatus::Pending,
        }
    }
}

#[async_trait]
impl ComputeService for EarthEngineClient {
    async fn submit_export(&self, request: &ExportRequest) -> Result<ExportJob, ServiceError> {
        debug!(key = %request.key, url = %self.export_url(), "Submitting image export");
        let http_request = self.http.post(self.export_url()).json(&export_body(request));
        let http_request = authorised(&self.tokens, http_request).await?;
        let operation: Operation = send_json("image:export", http_request).await?;
        info!(key = %request.key, operation = %operation.name, "Export task started");
        Ok(ExportJob {
            id: operation.name,
            key: request.key.clone(),
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ServiceError> {
        let http_request = authorised(&self.tokens, self.http.get(self.operation_url(job_id))).await?;
        let operation: Operation = send_json("operations.get", http_request).await?;
        let status = operation.job_status();
        debug!(operation = %operation.name, ?status, "Polled export task");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(body: Value) -> Operation {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn export_body_targets_bucket_and_key() {
        let request = ExportRequest {
            key: "lc_glob_2017_1970_13_100".into(),
            bucket: "chips".into(),
            expression: json!({"result": "0"}),
        };
        let body = export_body(&request);
        assert_eq!(body["description"], "lc_glob_2017_1970_13_100");
        assert_eq!(body["expression"]["result"], "0");
        let options = &body["fileExportOptions"];
        assert_eq!(options["fileFormat"], "GEO_TIFF");
        assert_eq!(options["cloudStorageDestination"]["bucket"], "chips");
        assert_eq!(
            options["cloudStorageDestination"]["filenamePrefix"],
            "lc_glob_2017_1970_13_100"
        );
    }

    #[test]
    fn urls_use_configured_base() {
        let key = crate::auth::ServiceAccountKey::from_json(
            r#"{"client_email": "a@b", "private_key": "pem"}"#,
            std::path::Path::new("k.json"),
        )
        .unwrap();
        let tokens = Arc::new(TokenProvider::new(reqwest::Client::new(), key));
        let client = EarthEngineClient::new(reqwest::Client::new(), tokens, "eelc-test")
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            client.export_url(),
            "http://localhost:8080/v1/projects/eelc-test/image:export"
        );
        assert_eq!(
            client.operation_url("projects/eelc-test/operations/ABC"),
            "http://localhost:8080/v1/projects/eelc-test/operations/ABC"
        );
    }

    #[test]
    fn running_states_are_unresolved() {
        for (state, expected) in [
            ("PENDING", JobStatus::Pending),
            ("RUNNING", JobStatus::Running),
            ("CANCELLING", JobStatus::Running),
        ] {
            let op = operation(json!({
                "name": "projects/p/operations/ABC",
                "metadata": {"state": state},
            }));
            assert_eq!(op.job_status(), expected, "{state}");
        }
    }

    #[test]
    fn succeeded_reports_first_destination() {
        let op = operation(json!({
            "name": "projects/p/operations/ABC",
            "done": true,
            "metadata": {
                "@type": "type.googleapis.com/google.earthengine.v1.OperationMetadata",
                "state": "SUCCEEDED",
                "destinationUris": [
                    "https://console.developers.google.com/storage/browser/chips/",
                    "gs://chips/other"
                ]
            },
            "response": {"@type": "type.googleapis.com/google.protobuf.Empty"}
        }));
        assert_eq!(
            op.job_status(),
            JobStatus::Completed {
                destination_uri: Some(
                    "https://console.developers.google.com/storage/browser/chips/".into()
                )
            }
        );
    }

    #[test]
    fn failure_carries_error_message() {
        let op = operation(json!({
            "name": "projects/p/operations/ABC",
            "done": true,
            "metadata": {"state": "FAILED"},
            "error": {"code": 3, "message": "Image.clipToBoundsAndScale: empty geometry"}
        }));
        assert_eq!(
            op.job_status(),
            JobStatus::Failed {
                error_message: "Image.clipToBoundsAndScale: empty geometry".into()
            }
        );
    }

    #[test]
    fn cancelled_without_error_has_generic_message() {
        let op = operation(json!({
            "name": "projects/p/operations/ABC",
            "done": true,
            "metadata": {"state": "CANCELLED"}
        }));
        assert_eq!(
            op.job_status(),
            JobStatus::Failed {
                error_message: "export cancelled".into()
            }
        );
    }

    #[test]
    fn bare_operation_is_pending() {
        let op = operation(json!({"name": "projects/p/operations/ABC"}));
        assert_eq!(op.job_status(), JobStatus::Pending);
    }
}
