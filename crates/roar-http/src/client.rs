//! Signed JSON HTTP client for the LaaS server (§4.11).
//!
//! Grounded on `original_source/roar/glaas_client.py`'s `GlaasClient`
//! (`_request`/`_parse_json_response`/`health_check`) for the
//! request/response/error-handling shape, and on
//! `ohitslaurence-agent-loop/crates/loopctl/src/client.rs` for the
//! idiomatic-Rust `reqwest` wrapper style (typed client struct, a shared
//! header builder, a `handle_error`-equivalent for non-2xx responses).

use std::time::Duration;

use roar_config::GlaasConfig;
use roar_error::{ErrorCode, RoarError};
use serde_json::Value;

use crate::signing::make_auth_header;

/// Regular request timeout (§5).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for health/auth probes (§5).
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Signed HTTP client for `/api/v1/*`.
pub struct GlaasClient {
    base_url: Option<String>,
    glaas: GlaasConfig,
    http: reqwest::Client,
}

impl GlaasClient {
    /// Build a client. `base_url` resolution order: an explicit override,
    /// then `config.glaas.url`, then `$GLAAS_URL`.
    pub fn new(glaas: GlaasConfig, base_url_override: Option<String>) -> Self {
        let base_url = base_url_override
            .or_else(|| glaas.url.clone())
            .or_else(|| std::env::var("GLAAS_URL").ok())
            .map(|u| u.trim_end_matches('/').to_string());
        Self { base_url, glaas, http: reqwest::Client::new() }
    }

    /// `true` iff a server URL is configured.
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn url(&self, path: &str) -> Result<String, RoarError> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| RoarError::new(ErrorCode::ValidationFailed, "GLaaS URL not configured"))?;
        Ok(format!("{base}{path}"))
    }

    /// `GET /api/v1/health`, with the shorter probe timeout.
    pub async fn health_check(&self) -> Result<(), RoarError> {
        let url = self.url("/api/v1/health")?;
        let response = self
            .http
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RoarError::new(ErrorCode::HttpServerError, format!("health check returned HTTP {}", response.status())))
        }
    }

    /// Signed JSON request. `path` must be the request path only (no
    /// scheme/host) so the same string is both requested and signed.
    pub async fn request(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> Result<Value, RoarError> {
        let url = self.url(path)?;
        let body_bytes = body.map(|b| serde_json::to_vec(b)).transpose().map_err(|e| {
            RoarError::new(ErrorCode::Internal, "failed to serialize request body").with_source(e)
        })?;

        let auth_header = make_auth_header(&self.glaas, method.as_str(), path, body_bytes.as_deref())?;

        let mut request = self.http.request(method, &url).timeout(REQUEST_TIMEOUT).header("Authorization", auth_header);
        if let Some(bytes) = body_bytes {
            request = request.header("Content-Type", "application/json").body(bytes);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body_text = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            return parse_success_body(&body_text, status.as_u16());
        }

        Err(map_error_response(status, &body_text))
    }

    /// `POST /api/v1/sessions`.
    pub async fn register_session(&self, session_hash: &str, git_repo: &str, git_commit: &str, git_branch: &str) -> Result<Value, RoarError> {
        let body = serde_json::json!({
            "hash": session_hash,
            "git_repo": git_repo,
            "git_commit": git_commit,
            "git_branch": git_branch,
        });
        self.request(reqwest::Method::POST, "/api/v1/sessions", Some(&body)).await
    }

    /// `GET /api/v1/sessions/{hash}`.
    pub async fn get_session(&self, session_hash: &str) -> Result<Value, RoarError> {
        self.request(reqwest::Method::GET, &format!("/api/v1/sessions/{session_hash}"), None).await
    }

    /// `POST /api/v1/sessions/{hash}/jobs`.
    pub async fn register_job(&self, session_hash: &str, job: &Value) -> Result<Value, RoarError> {
        self.request(reqwest::Method::POST, &format!("/api/v1/sessions/{session_hash}/jobs"), Some(job)).await
    }

    /// `POST /api/v1/artifacts/batch`.
    pub async fn register_artifacts_batch(&self, artifacts: &[Value]) -> Result<Value, RoarError> {
        let body = serde_json::json!({ "artifacts": artifacts });
        self.request(reqwest::Method::POST, "/api/v1/artifacts/batch", Some(&body)).await
    }

    /// `POST /api/v1/sessions/{hash}/jobs/{uid}/inputs`.
    pub async fn register_job_inputs(&self, session_hash: &str, job_uid: &str, artifacts: &[Value]) -> Result<Value, RoarError> {
        let body = serde_json::json!({ "artifacts": artifacts });
        self.request(reqwest::Method::POST, &format!("/api/v1/sessions/{session_hash}/jobs/{job_uid}/inputs"), Some(&body)).await
    }

    /// `POST /api/v1/sessions/{hash}/jobs/{uid}/outputs`.
    pub async fn register_job_outputs(&self, session_hash: &str, job_uid: &str, artifacts: &[Value]) -> Result<Value, RoarError> {
        let body = serde_json::json!({ "artifacts": artifacts });
        self.request(reqwest::Method::POST, &format!("/api/v1/sessions/{session_hash}/jobs/{job_uid}/outputs"), Some(&body)).await
    }

    /// `GET /api/v1/artifacts/{hash_prefix}`.
    pub async fn get_artifact(&self, hash_prefix: &str) -> Result<Value, RoarError> {
        self.request(reqwest::Method::GET, &format!("/api/v1/artifacts/{hash_prefix}"), None).await
    }

    /// `GET /api/v1/artifacts/{hash_prefix}/lineage[?depth=N]`.
    pub async fn get_artifact_lineage(&self, hash_prefix: &str, depth: u32) -> Result<Value, RoarError> {
        let path = if depth > 1 {
            format!("/api/v1/artifacts/{hash_prefix}/lineage?depth={depth}")
        } else {
            format!("/api/v1/artifacts/{hash_prefix}/lineage")
        };
        self.request(reqwest::Method::GET, &path, None).await
    }

    /// `GET /api/v1/artifacts/{hash_prefix}/dag`.
    pub async fn get_artifact_dag(&self, hash_prefix: &str) -> Result<Value, RoarError> {
        self.request(reqwest::Method::GET, &format!("/api/v1/artifacts/{hash_prefix}/dag"), None).await
    }
}

fn transport_error(e: reqwest::Error) -> RoarError {
    RoarError::new(ErrorCode::HttpTransport, format!("request failed: {e}")).with_source(e)
}

/// Parse a 2xx body: empty/whitespace → `{}`; HTML → error; invalid JSON →
/// error with byte offset; `{success, data}` envelopes unwrapped.
fn parse_success_body(body: &str, http_status: u16) -> Result<Value, RoarError> {
    if body.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }

    let stripped = body.trim();
    if stripped.starts_with("<!") || stripped.to_lowercase().starts_with("<html") {
        let preview: String = body.chars().take(100).collect();
        return Err(RoarError::new(
            ErrorCode::ResponseFormat,
            format!("server returned HTML instead of JSON (HTTP {http_status}): '{preview}...'"),
        ));
    }

    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(100).collect();
        RoarError::new(
            ErrorCode::ResponseFormat,
            format!("invalid JSON in response (HTTP {http_status}) at line {} column {}: '{preview}...'", e.line(), e.column()),
        )
    })?;

    if let Value::Object(ref map) = parsed {
        if map.get("success").and_then(Value::as_bool) == Some(true) {
            if let Some(data) = map.get("data") {
                return Ok(data.clone());
            }
        }
    }
    Ok(parsed)
}

/// Map a non-2xx response to the §4.11 error taxonomy.
fn map_error_response(status: reqwest::StatusCode, body: &str) -> RoarError {
    let code = status.as_u16();
    let stripped = body.trim();
    let is_html = stripped.starts_with("<!") || stripped.to_lowercase().starts_with("<html");

    if code == 401 {
        return RoarError::new(ErrorCode::HttpServerError, "authentication missing or invalid").with_context("status", code);
    }

    if code == 403 && is_html {
        return RoarError::new(
            ErrorCode::HttpServerError,
            "access denied by proxy or firewall (received HTML 403); check network configuration",
        )
        .with_context("status", code);
    }

    if code == 404 {
        return RoarError::new(ErrorCode::HttpServerError, "not found").with_context("status", code);
    }

    if code == 413 || (status.is_server_error() && is_size_related(body)) {
        return RoarError::new(ErrorCode::HttpPayloadTooLarge, "request payload exceeds the server's body size limit")
            .with_context("status", code);
    }

    let detail = extract_detail(body);
    RoarError::new(ErrorCode::HttpServerError, format!("HTTP {code}: {detail}")).with_context("status", code)
}

fn is_size_related(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("too large") || lower.contains("payload") && lower.contains("size")
}

fn extract_detail(body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(detail) = map.get("detail").or_else(|| map.get("message")).and_then(Value::as_str) {
            return detail.to_string();
        }
    }
    if body.len() > 100 {
        let preview: String = body.chars().take(100).collect();
        format!("non-JSON response: '{preview}...'")
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_parses_as_empty_object() {
        assert_eq!(parse_success_body("", 200).unwrap(), serde_json::json!({}));
        assert_eq!(parse_success_body("   ", 200).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn html_body_is_a_response_format_error() {
        let err = parse_success_body("<!DOCTYPE html><html>oops</html>", 200).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResponseFormat);
    }

    #[test]
    fn invalid_json_is_a_response_format_error() {
        let err = parse_success_body("{not json", 200).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResponseFormat);
    }

    #[test]
    fn success_envelope_is_unwrapped() {
        let parsed = parse_success_body(r#"{"success":true,"data":{"id":1}}"#, 200).unwrap();
        assert_eq!(parsed, serde_json::json!({"id": 1}));
    }

    #[test]
    fn non_envelope_object_passes_through() {
        let parsed = parse_success_body(r#"{"id":1}"#, 200).unwrap();
        assert_eq!(parsed, serde_json::json!({"id": 1}));
    }

    #[test]
    fn status_401_maps_to_server_error_with_status_context() {
        let err = map_error_response(reqwest::StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.code, ErrorCode::HttpServerError);
        assert_eq!(err.context.get("status").and_then(Value::as_u64), Some(401));
    }

    #[test]
    fn status_403_with_html_mentions_proxy() {
        let err = map_error_response(reqwest::StatusCode::FORBIDDEN, "<html>blocked</html>");
        assert!(err.message.contains("proxy"));
    }

    #[test]
    fn status_404_is_reported_with_status_context_for_positive_signal_use() {
        let err = map_error_response(reqwest::StatusCode::NOT_FOUND, "");
        assert_eq!(err.context.get("status").and_then(Value::as_u64), Some(404));
    }

    #[test]
    fn status_413_is_payload_too_large() {
        let err = map_error_response(reqwest::StatusCode::PAYLOAD_TOO_LARGE, "");
        assert_eq!(err.code, ErrorCode::HttpPayloadTooLarge);
    }

    #[test]
    fn other_5xx_extracts_fastapi_style_detail() {
        let err = map_error_response(reqwest::StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":"db down"}"#);
        assert!(err.message.contains("db down"));
    }

    #[test]
    fn is_configured_reflects_base_url_presence() {
        let client = GlaasClient::new(GlaasConfig::default(), None);
        assert!(!client.is_configured());
        let client = GlaasClient::new(GlaasConfig::default(), Some("http://localhost:8000".into()));
        assert!(client.is_configured());
    }
}
