//! # contract: interfaces to the remote compute service and object store
//!
//! The scheduler and the remote-state filter are written against the two
//! traits in this module rather than against concrete HTTP clients:
//!
//! - [`ComputeService`]: submit an export job, query its status.
//! - [`ObjectStore`]: list object names in the destination bucket.
//!
//! The CLI crate implements both for Earth Engine and Cloud Storage. Tests use
//! the `mockall` mocks generated here (`MockComputeService`, `MockObjectStore`),
//! exported to dependents through the `test-export-mocks` feature.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Everything the compute service needs to render and store one chip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Object key; also used as the task description.
    pub key: String,
    /// Destination bucket.
    pub bucket: String,
    /// Serialized image expression for the service.
    pub expression: serde_json::Value,
}

/// Handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub id: String,
    pub key: String,
}

/// Last observed state of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed { destination_uri: Option<String> },
    Failed { error_message: String },
}

/// Remote batch compute API (e.g. Earth Engine export tasks).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Submit and start an export job.
    async fn submit_export(&self, request: &ExportRequest) -> Result<ExportJob, ServiceError>;

    /// Query the current status of a previously submitted job.
    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ServiceError>;
}

/// Destination object storage (e.g. a Cloud Storage bucket).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Names of every object currently in the bucket.
    async fn list_object_names(&self) -> Result<Vec<String>, ServiceError>;
}
