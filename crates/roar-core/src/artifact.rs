//! Artifact and artifact-hash domain types.

use roar_error::{ErrorCode, RoarError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One of the four supported content-hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 — the preferred algorithm; used as the primary hash when present.
    Blake3,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
    /// MD5 — kept for interop with external tooling that still emits it.
    Md5,
}

impl HashAlgorithm {
    /// The lowercase name used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Md5 => "md5",
        }
    }

    /// Parse from the lowercase name, or `None` if unrecognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blake3" => Some(Self::Blake3),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            "md5" => Some(Self::Md5),
            _ => None,
        }
    }
}

/// A single `(algorithm, digest)` pair for an artifact.
///
/// `(algorithm, digest)` is globally unique in the store: two artifacts
/// can never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactHash {
    /// Hash algorithm.
    pub algorithm: HashAlgorithm,
    /// Lowercase-hex digest, 8-128 characters.
    pub digest: String,
}

impl ArtifactHash {
    /// Construct a validated `ArtifactHash`, lowercasing the digest first
    /// (mirroring the original model's `normalize_digest` validator).
    pub fn new(algorithm: HashAlgorithm, digest: impl Into<String>) -> Result<Self, RoarError> {
        let digest = digest.into().to_lowercase();
        if digest.len() < 8 || digest.len() > 128 {
            return Err(RoarError::new(
                ErrorCode::ValidationFailed,
                format!("digest length {} out of range [8, 128]", digest.len()),
            ));
        }
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RoarError::new(
                ErrorCode::ValidationFailed,
                "digest must be lowercase hex",
            ));
        }
        Ok(Self { algorithm, digest })
    }
}

/// A content-addressed file tracked by one or more hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// Stable opaque id.
    pub id: String,
    /// File size in bytes.
    pub size: u64,
    /// Unix timestamp this artifact was first observed.
    pub first_seen_at: f64,
    /// Path it was first observed at, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen_path: Option<String>,
    /// `s3` | `gs` | `https`, if the artifact originated from a cloud fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Source URL, when `source_type` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Cloud destination this artifact's bytes were last uploaded to,
    /// independent of LaaS registration (supplemented field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_to: Option<String>,
    /// Last time this artifact was registered with the LaaS server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<f64>,
    /// Opaque JSON metadata blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// All known hashes for this artifact.
    pub hashes: Vec<ArtifactHash>,
}

impl Artifact {
    /// The canonical single digest for this artifact: `blake3` if present,
    /// else the first hash by insertion order. `None` for a hash-less
    /// artifact (which should not normally exist — see invariants).
    pub fn primary_hash(&self) -> Option<&str> {
        self.hashes
            .iter()
            .find(|h| h.algorithm == HashAlgorithm::Blake3)
            .or_else(|| self.hashes.first())
            .map(|h| h.digest.as_str())
    }

    /// `source_type` must be one of the allowed values or absent (§4.12
    /// phase-3 validation rule).
    pub fn has_valid_source_type(&self) -> bool {
        match self.source_type.as_deref() {
            None => true,
            Some(t) => matches!(t, "s3" | "gs" | "https"),
        }
    }
}
