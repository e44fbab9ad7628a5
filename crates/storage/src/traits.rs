use graft_core::{
    field_value::FieldValue,
    ids::{ActorId, AttachmentId, BackupId, EntityId, TermId, UserId},
};

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    pub schema: String,
    pub title: String,
    pub created_at: i64,
}

/// One durable field snapshot for a target entity. The snapshot blob is
/// opaque at this layer; the engine owns its encoding.
#[derive(Debug, Clone)]
pub struct BackupRecord {
    pub backup_id: BackupId,
    pub target_entity_id: EntityId,
    pub actor_id: ActorId,
    pub created_at: i64,
    pub checksum: [u8; 32],
    pub snapshot: Vec<u8>,
}

pub trait EntityStore {
    fn insert_entity(&mut self, record: &EntityRecord) -> Result<(), StorageError>;

    fn get_entity(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, StorageError>;

    fn entities_by_schema(&self, schema: &str) -> Result<Vec<EntityRecord>, StorageError>;

    fn get_fields(&self, entity_id: EntityId) -> Result<Vec<(String, FieldValue)>, StorageError>;

    fn get_field(
        &self,
        entity_id: EntityId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, StorageError>;

    fn set_field(
        &mut self,
        entity_id: EntityId,
        field_key: &str,
        value: &FieldValue,
    ) -> Result<(), StorageError>;

    fn clear_field(&mut self, entity_id: EntityId, field_key: &str) -> Result<(), StorageError>;
}

/// Read-only existence checks used when revalidating reference values
/// against the target context.
pub trait ReferenceResolver {
    fn attachment_exists(&self, id: AttachmentId) -> Result<bool, StorageError>;

    fn entity_exists(&self, id: EntityId) -> Result<bool, StorageError>;

    fn taxonomy_exists(&self, taxonomy: &str) -> Result<bool, StorageError>;

    fn term_exists(&self, taxonomy: &str, id: TermId) -> Result<bool, StorageError>;

    fn user_exists(&self, id: UserId) -> Result<bool, StorageError>;
}

pub trait BackupStore {
    fn insert_backup(&mut self, record: &BackupRecord) -> Result<(), StorageError>;

    fn get_backup(&self, id: BackupId) -> Result<Option<BackupRecord>, StorageError>;

    /// Returns true if a record was deleted.
    fn delete_backup(&mut self, id: BackupId) -> Result<bool, StorageError>;

    /// Backups for one target entity, newest first.
    fn list_backups(&self, target: EntityId) -> Result<Vec<BackupRecord>, StorageError>;

    /// Age rule: delete records created strictly before the cutoff.
    fn delete_backups_before(&mut self, cutoff_ms: i64) -> Result<u64, StorageError>;

    fn backup_count(&self) -> Result<u64, StorageError>;

    /// Count rule: delete the `excess` oldest records by creation time.
    fn delete_oldest_backups(&mut self, excess: u64) -> Result<u64, StorageError>;
}
