//! Unified error taxonomy for roar.
//!
//! Every fallible operation in the workspace returns `Result<T, RoarError>`.
//! A [`RoarError`] carries a stable [`ErrorCode`] (machine-readable, never
//! renamed across patch releases), a human-readable message, structured
//! context for diagnostics, and an optional source for cause-chaining. Use
//! [`RoarError::new`] to build one fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family an [`ErrorCode`] belongs to, mirroring the error handling
/// design's categories: preflight checks, the tracer, hashing, the local
/// store, registration with the LaaS server, secret handling, request
/// signing, configuration, and an internal catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Checks that run before any tracing or store access.
    Preflight,
    /// The syscall tracer and its sidecar.
    Tracer,
    /// Hashing a single file.
    Hashing,
    /// The local SQLite-backed lineage store.
    Database,
    /// The four-phase registration protocol against the LaaS server.
    Registration,
    /// Secret detection and redaction.
    Secrets,
    /// Request signing for the LaaS client.
    Signing,
    /// Configuration loading and validation.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preflight => "preflight",
            Self::Tracer => "tracer",
            Self::Hashing => "hashing",
            Self::Database => "database",
            Self::Registration => "registration",
            Self::Secrets => "secrets",
            Self::Signing => "signing",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Preflight --
    /// The current directory is not inside a git repository.
    NotAGitRepo,
    /// The git working tree has uncommitted changes.
    DirtyWorkingTree,
    /// `.roar` has not been initialized with `roar init`.
    NotInitialized,

    // -- Tracer --
    /// The `roar-tracer` binary could not be located.
    TracerNotFound,
    /// The tracer process exited abnormally.
    TracerCrashed,
    /// The sidecar's output could not be parsed.
    SidecarMalformed,

    // -- Hashing --
    /// I/O error while streaming a file through a hasher.
    HashIoError,

    // -- Database --
    /// Could not open or create the SQLite database.
    DbConnectionFailed,
    /// The on-disk schema does not match the expected version.
    DbSchemaMismatch,
    /// A hash prefix matched more than one artifact.
    AmbiguousHash,

    // -- Registration --
    /// A required field was missing, empty, or a placeholder value.
    ValidationFailed,
    /// Network-level failure (connect, timeout, DNS).
    HttpTransport,
    /// The server returned a 5xx response.
    HttpServerError,
    /// The request body exceeded the server's size limit.
    HttpPayloadTooLarge,
    /// The response body could not be parsed as the expected shape.
    ResponseFormat,

    // -- Secrets --
    /// The user declined to proceed after secrets were detected.
    SecretsDeclined,

    // -- Signing --
    /// No SSH key was found to sign requests with.
    NoSigningKey,
    /// Invoking `ssh-keygen` to sign the request failed.
    SigningFailed,

    // -- Config --
    /// `config.toml` could not be parsed.
    ConfigParseError,
    /// `config.toml` parsed but failed validation.
    ConfigValidationError,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAGitRepo | Self::DirtyWorkingTree | Self::NotInitialized => {
                ErrorCategory::Preflight
            }

            Self::TracerNotFound | Self::TracerCrashed | Self::SidecarMalformed => {
                ErrorCategory::Tracer
            }

            Self::HashIoError => ErrorCategory::Hashing,

            Self::DbConnectionFailed | Self::DbSchemaMismatch | Self::AmbiguousHash => {
                ErrorCategory::Database
            }

            Self::ValidationFailed
            | Self::HttpTransport
            | Self::HttpServerError
            | Self::HttpPayloadTooLarge
            | Self::ResponseFormat => ErrorCategory::Registration,

            Self::SecretsDeclined => ErrorCategory::Secrets,

            Self::NoSigningKey | Self::SigningFailed => ErrorCategory::Signing,

            Self::ConfigParseError | Self::ConfigValidationError => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation, e.g. `"TRACER_NOT_FOUND"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAGitRepo => "NOT_A_GIT_REPO",
            Self::DirtyWorkingTree => "DIRTY_WORKING_TREE",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::TracerNotFound => "TRACER_NOT_FOUND",
            Self::TracerCrashed => "TRACER_CRASHED",
            Self::SidecarMalformed => "SIDECAR_MALFORMED",
            Self::HashIoError => "HASH_IO_ERROR",
            Self::DbConnectionFailed => "DB_CONNECTION_FAILED",
            Self::DbSchemaMismatch => "DB_SCHEMA_MISMATCH",
            Self::AmbiguousHash => "AMBIGUOUS_HASH",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::HttpTransport => "HTTP_TRANSPORT",
            Self::HttpServerError => "HTTP_SERVER_ERROR",
            Self::HttpPayloadTooLarge => "HTTP_PAYLOAD_TOO_LARGE",
            Self::ResponseFormat => "RESPONSE_FORMAT",
            Self::SecretsDeclined => "SECRETS_DECLINED",
            Self::NoSigningKey => "NO_SIGNING_KEY",
            Self::SigningFailed => "SIGNING_FAILED",
            Self::ConfigParseError => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError => "CONFIG_VALIDATION_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RoarError
// ---------------------------------------------------------------------------

/// Unified roar error.
///
/// # Example
///
/// ```
/// use roar_error::{RoarError, ErrorCode};
///
/// let err = RoarError::new(ErrorCode::TracerNotFound, "roar-tracer not on PATH")
///     .with_context("searched", vec!["/usr/local/bin/roar-tracer"]);
/// ```
pub struct RoarError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl RoarError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context. Silently skipped
    /// if the value does not serialize.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for RoarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RoarError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for RoarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RoarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for RoarError {
    fn from(err: std::io::Error) -> Self {
        RoarError::new(ErrorCode::Internal, err.to_string()).with_source(err)
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`RoarError`] (without the opaque source),
/// used for `--json` CLI output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoarErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&RoarError> for RoarErrorDto {
    fn from(err: &RoarError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<RoarErrorDto> for RoarError {
    fn from(dto: RoarErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::NotAGitRepo,
        ErrorCode::DirtyWorkingTree,
        ErrorCode::NotInitialized,
        ErrorCode::TracerNotFound,
        ErrorCode::TracerCrashed,
        ErrorCode::SidecarMalformed,
        ErrorCode::HashIoError,
        ErrorCode::DbConnectionFailed,
        ErrorCode::DbSchemaMismatch,
        ErrorCode::AmbiguousHash,
        ErrorCode::ValidationFailed,
        ErrorCode::HttpTransport,
        ErrorCode::HttpServerError,
        ErrorCode::HttpPayloadTooLarge,
        ErrorCode::ResponseFormat,
        ErrorCode::SecretsDeclined,
        ErrorCode::NoSigningKey,
        ErrorCode::SigningFailed,
        ErrorCode::ConfigParseError,
        ErrorCode::ConfigValidationError,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = RoarError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = RoarError::new(ErrorCode::TracerNotFound, "not on PATH");
        assert_eq!(err.to_string(), "[TRACER_NOT_FOUND] not on PATH");
    }

    #[test]
    fn display_with_context() {
        let err =
            RoarError::new(ErrorCode::HttpPayloadTooLarge, "batch too big").with_context("bytes", 102_400);
        let s = err.to_string();
        assert!(s.starts_with("[HTTP_PAYLOAD_TOO_LARGE] batch too big"));
        assert!(s.contains("bytes"));
    }

    #[test]
    fn preflight_codes_categorised() {
        assert_eq!(ErrorCode::NotAGitRepo.category(), ErrorCategory::Preflight);
        assert_eq!(ErrorCode::DirtyWorkingTree.category(), ErrorCategory::Preflight);
        assert_eq!(ErrorCode::NotInitialized.category(), ErrorCategory::Preflight);
    }

    #[test]
    fn registration_codes_categorised() {
        for code in [
            ErrorCode::ValidationFailed,
            ErrorCode::HttpTransport,
            ErrorCode::HttpServerError,
            ErrorCode::HttpPayloadTooLarge,
            ErrorCode::ResponseFormat,
        ] {
            assert_eq!(code.category(), ErrorCategory::Registration);
        }
    }

    #[test]
    fn signing_codes_categorised() {
        assert_eq!(ErrorCode::NoSigningKey.category(), ErrorCategory::Signing);
        assert_eq!(ErrorCode::SigningFailed.category(), ErrorCategory::Signing);
    }

    #[test]
    fn builder_with_source() {
        let src = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = RoarError::new(ErrorCode::DbConnectionFailed, "denied").with_source(src);
        assert!(err.source.is_some());
        assert_eq!(err.source.as_ref().unwrap().to_string(), "access denied");
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate as_str: {code:?}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn error_code_count() {
        assert_eq!(ALL_CODES.len(), 21);
    }

    #[test]
    fn dto_roundtrip_without_source() {
        let err = RoarError::new(ErrorCode::ConfigValidationError, "bad").with_context("key", "glaas.url");
        let dto: RoarErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: RoarErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert!(back.source_message.is_none());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: RoarError = io_err.into();
        assert_eq!(err.code, ErrorCode::Internal);
    }
}
