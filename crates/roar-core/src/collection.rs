//! Collections: named, ordered groupings of artifacts and nested collections.

use roar_error::{ErrorCode, RoarError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named, ordered group — e.g. a dataset version made of many files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Collection {
    /// Database row id.
    pub id: i64,
    /// Unique collection name.
    pub name: String,
    /// Unix timestamp of creation.
    pub created_at: f64,
    /// Opaque JSON metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// One ordered member of a collection: either a leaf artifact or a nested
/// collection, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CollectionMember {
    /// Owning collection id.
    pub collection_id: i64,
    /// Position within the collection (0-based).
    pub position: u32,
    /// Member artifact, if this is a leaf member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    /// Member collection, if this is a nested member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_collection_id: Option<i64>,
}

impl CollectionMember {
    /// Build a leaf (artifact) member.
    pub fn artifact(collection_id: i64, position: u32, artifact_id: impl Into<String>) -> Self {
        Self {
            collection_id,
            position,
            artifact_id: Some(artifact_id.into()),
            child_collection_id: None,
        }
    }

    /// Build a nested (sub-collection) member.
    pub fn child_collection(collection_id: i64, position: u32, child_collection_id: i64) -> Self {
        Self {
            collection_id,
            position,
            artifact_id: None,
            child_collection_id: Some(child_collection_id),
        }
    }

    /// Enforce the "exactly one of artifact_id/child_collection_id" invariant.
    pub fn validate(&self) -> Result<(), RoarError> {
        match (&self.artifact_id, &self.child_collection_id) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(RoarError::new(
                ErrorCode::ValidationFailed,
                "collection member must reference an artifact or a child collection",
            )),
            (Some(_), Some(_)) => Err(RoarError::new(
                ErrorCode::ValidationFailed,
                "collection member cannot reference both an artifact and a child collection",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_member_is_valid() {
        let m = CollectionMember::artifact(1, 0, "art-1");
        assert!(m.validate().is_ok());
    }

    #[test]
    fn child_collection_member_is_valid() {
        let m = CollectionMember::child_collection(1, 0, 2);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn empty_member_is_invalid() {
        let m = CollectionMember {
            collection_id: 1,
            position: 0,
            artifact_id: None,
            child_collection_id: None,
        };
        assert!(m.validate().is_err());
    }

    #[test]
    fn dual_reference_member_is_invalid() {
        let m = CollectionMember {
            collection_id: 1,
            position: 0,
            artifact_id: Some("art-1".into()),
            child_collection_id: Some(2),
        };
        assert!(m.validate().is_err());
    }
}
