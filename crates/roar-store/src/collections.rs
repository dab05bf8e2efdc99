//! Named, ordered artifact collections.

use roar_core::{Collection, CollectionMember};
use roar_error::RoarError;
use rusqlite::params;

use crate::error::db_error;
use crate::Store;

impl Store {
    /// Create a collection and insert its members in order, validating
    /// each member first.
    pub fn create_collection(
        &self,
        name: &str,
        members: &[CollectionMember],
    ) -> Result<Collection, RoarError> {
        for member in members {
            member.validate()?;
        }

        self.conn
            .execute(
                "INSERT INTO collections (name, created_at) VALUES (?1, ?2)",
                params![name, crate::now_unix()],
            )
            .map_err(|e| db_error("insert collection", e))?;
        let id = self.conn.last_insert_rowid();

        for member in members {
            self.conn
                .execute(
                    "INSERT INTO collection_members
                     (collection_id, position, artifact_id, child_collection_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, member.position, member.artifact_id, member.child_collection_id],
                )
                .map_err(|e| db_error("insert collection member", e))?;
        }

        self.conn
            .query_row(
                "SELECT id, name, created_at, metadata FROM collections WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Collection {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        metadata: row.get(3)?,
                    })
                },
            )
            .map_err(|e| db_error("reload collection", e))
    }

    /// All members of `collection_id`, ordered by `position`.
    pub fn get_collection_members(&self, collection_id: i64) -> Result<Vec<CollectionMember>, RoarError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT collection_id, position, artifact_id, child_collection_id
                 FROM collection_members WHERE collection_id = ?1 ORDER BY position",
            )
            .map_err(|e| db_error("prepare collection members", e))?;
        let rows = stmt
            .query_map(params![collection_id], |row| {
                Ok(CollectionMember {
                    collection_id: row.get(0)?,
                    position: row.get::<_, i64>(1)? as u32,
                    artifact_id: row.get(2)?,
                    child_collection_id: row.get(3)?,
                })
            })
            .map_err(|e| db_error("query collection members", e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| db_error("read collection member row", e))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_collection_with_artifact_members() {
        let store = Store::open_in_memory().unwrap();
        let members = vec![
            CollectionMember::artifact(0, 0, "art-1"),
            CollectionMember::artifact(0, 1, "art-2"),
        ];
        let collection = store.create_collection("dataset-v1", &members).unwrap();
        let loaded = store.get_collection_members(collection.id).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].artifact_id.as_deref(), Some("art-1"));
    }

    #[test]
    fn invalid_member_rejects_creation() {
        let store = Store::open_in_memory().unwrap();
        let bad = CollectionMember {
            collection_id: 0,
            position: 0,
            artifact_id: None,
            child_collection_id: None,
        };
        assert!(store.create_collection("bad", &[bad]).is_err());
    }
}
