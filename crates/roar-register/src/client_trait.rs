//! The slice of [`roar_http::GlaasClient`] the coordinator depends on,
//! behind a trait so phase logic can be tested without a signed HTTP
//! round-trip.
//!
//! Grounded on
//! `original_source/roar/core/interfaces/registration.py`'s
//! `IArtifactRegistrar`/`IJobRegistrar` protocols, which exist for the
//! same reason (the Python services accept an injected client).

use async_trait::async_trait;
use roar_error::RoarError;
use roar_http::GlaasClient;
use serde_json::Value;

/// Registration-relevant subset of the LaaS API.
#[async_trait]
pub trait LineageClient: Send + Sync {
    /// `POST /api/v1/sessions/{hash}/jobs`.
    async fn register_job(&self, session_hash: &str, job: &Value) -> Result<Value, RoarError>;

    /// `POST /api/v1/artifacts/batch`.
    async fn register_artifacts_batch(&self, artifacts: &[Value]) -> Result<Value, RoarError>;

    /// `POST /api/v1/sessions/{hash}/jobs/{uid}/inputs`.
    async fn register_job_inputs(&self, session_hash: &str, job_uid: &str, artifacts: &[Value]) -> Result<Value, RoarError>;

    /// `POST /api/v1/sessions/{hash}/jobs/{uid}/outputs`.
    async fn register_job_outputs(&self, session_hash: &str, job_uid: &str, artifacts: &[Value]) -> Result<Value, RoarError>;
}

#[async_trait]
impl LineageClient for GlaasClient {
    async fn register_job(&self, session_hash: &str, job: &Value) -> Result<Value, RoarError> {
        GlaasClient::register_job(self, session_hash, job).await
    }

    async fn register_artifacts_batch(&self, artifacts: &[Value]) -> Result<Value, RoarError> {
        GlaasClient::register_artifacts_batch(self, artifacts).await
    }

    async fn register_job_inputs(&self, session_hash: &str, job_uid: &str, artifacts: &[Value]) -> Result<Value, RoarError> {
        GlaasClient::register_job_inputs(self, session_hash, job_uid, artifacts).await
    }

    async fn register_job_outputs(&self, session_hash: &str, job_uid: &str, artifacts: &[Value]) -> Result<Value, RoarError> {
        GlaasClient::register_job_outputs(self, session_hash, job_uid, artifacts).await
    }
}
