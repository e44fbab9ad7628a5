use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use graft_core::{
    field_value::FieldValue,
    ids::{ActorId, BackupId, EntityId},
    time::{now_ms, MS_PER_DAY},
    CoreError,
};
use graft_storage::{BackupRecord, BackupStore, EntityStore, SqliteStore};

use crate::error::EngineError;
use crate::walker::AvailableFieldsReport;

pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_MAX_BACKUPS: u64 = 10;

/// Retention rules for the backup table. A zero disables that rule; both
/// active rules run on every sweep.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub retention_days: u32,
    pub max_backups: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

/// One snapshotted field: the pre-clone value plus the label and type tag
/// surfaced when listing backups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotField {
    pub value: FieldValue,
    pub label: String,
    pub field_type: String,
}

/// The decoded form of a backup record's snapshot blob, keyed by field key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub fields: BTreeMap<String, SnapshotField>,
}

impl BackupSnapshot {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub expired: u64,
    pub excess: u64,
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub success: bool,
    pub restored_fields: Vec<String>,
    pub errors: Vec<String>,
    pub target_entity_id: Option<EntityId>,
}

impl RestoreOutcome {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            restored_fields: Vec::new(),
            errors: vec![error],
            target_entity_id: None,
        }
    }
}

/// Point-in-time field snapshots with create/list/restore/delete and a
/// retention sweep. Snapshots capture the *target's* current values, never
/// the source's.
pub struct BackupManager {
    policy: RetentionPolicy,
}

impl BackupManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Snapshot the target's current values for every selected key that has
    /// one. Returns `None` when nothing has a value (no record is written).
    pub fn create(
        &self,
        store: &mut SqliteStore,
        target_report: &AvailableFieldsReport,
        target: EntityId,
        field_keys: &[String],
        actor: ActorId,
    ) -> Result<Option<BackupId>, EngineError> {
        let mut fields = BTreeMap::new();
        for key in field_keys {
            if let Some(report) = target_report.fields.get(key)
                && let Some(value) = &report.value
            {
                fields.insert(
                    key.clone(),
                    SnapshotField {
                        value: value.clone(),
                        label: report.descriptor.label.clone(),
                        field_type: report.descriptor.field_type.type_name().to_string(),
                    },
                );
            }
        }
        if fields.is_empty() {
            return Ok(None);
        }

        let snapshot = BackupSnapshot { fields };
        let blob = snapshot.to_msgpack()?;
        let checksum = *blake3::hash(&blob).as_bytes();
        let record = BackupRecord {
            backup_id: BackupId::new(),
            target_entity_id: target,
            actor_id: actor,
            created_at: now_ms()?,
            checksum,
            snapshot: blob,
        };
        store.insert_backup(&record)?;

        // Retention runs on every create; sweep failures are logged and
        // never surfaced to the caller.
        if let Err(e) = self.sweep(store) {
            tracing::warn!("retention sweep failed: {e}");
        }

        Ok(Some(record.backup_id))
    }

    /// Apply both retention rules: the age cutoff, then the total-count cap.
    pub fn sweep(&self, store: &mut SqliteStore) -> Result<SweepStats, EngineError> {
        let mut stats = SweepStats::default();
        if self.policy.retention_days > 0 {
            let cutoff = now_ms()? - i64::from(self.policy.retention_days) * MS_PER_DAY;
            stats.expired = store.delete_backups_before(cutoff)?;
        }
        if self.policy.max_backups > 0 {
            let count = store.backup_count()?;
            if count > self.policy.max_backups {
                stats.excess = store.delete_oldest_backups(count - self.policy.max_backups)?;
            }
        }
        Ok(stats)
    }

    /// Replay a snapshot verbatim onto its target entity. Per-field write
    /// failures are collected without aborting the remaining fields; the
    /// record is deleted afterwards only on full success with `delete_after`.
    pub fn restore(
        &self,
        store: &mut SqliteStore,
        raw_id: &str,
        delete_after: bool,
    ) -> Result<RestoreOutcome, EngineError> {
        // Format validation happens before any lookup.
        let backup_id = match BackupId::parse(raw_id) {
            Ok(id) => id,
            Err(e) => return Ok(RestoreOutcome::failed(e.to_string())),
        };

        let Some(record) = store.get_backup(backup_id)? else {
            return Ok(RestoreOutcome::failed(format!(
                "backup not found: {backup_id}"
            )));
        };

        if *blake3::hash(&record.snapshot).as_bytes() != record.checksum {
            return Ok(RestoreOutcome::failed(format!(
                "backup record is corrupt: {backup_id}"
            )));
        }

        let snapshot = match BackupSnapshot::from_msgpack(&record.snapshot) {
            Ok(s) => s,
            Err(e) => return Ok(RestoreOutcome::failed(e.to_string())),
        };

        let mut restored_fields = Vec::new();
        let mut errors = Vec::new();
        for (key, field) in &snapshot.fields {
            match store.set_field(record.target_entity_id, key, &field.value) {
                Ok(()) => restored_fields.push(key.clone()),
                Err(e) => errors.push(format!("failed to restore field '{key}': {e}")),
            }
        }

        let success = errors.is_empty();
        if success && delete_after {
            store.delete_backup(backup_id)?;
        }

        Ok(RestoreOutcome {
            success,
            restored_fields,
            errors,
            target_entity_id: Some(record.target_entity_id),
        })
    }

    pub fn delete(&self, store: &mut SqliteStore, id: BackupId) -> Result<bool, EngineError> {
        Ok(store.delete_backup(id)?)
    }

    /// Backups for one target entity, newest first.
    pub fn list(
        &self,
        store: &SqliteStore,
        target: EntityId,
    ) -> Result<Vec<BackupRecord>, EngineError> {
        Ok(store.list_backups(target)?)
    }
}
