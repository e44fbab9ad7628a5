use rusqlite::Connection;

use graft_core::{
    field_value::FieldValue,
    ids::{ActorId, AttachmentId, BackupId, EntityId, TermId, UserId},
    time::now_ms,
};

use crate::error::StorageError;
use crate::traits::{BackupRecord, BackupStore, EntityRecord, EntityStore, ReferenceResolver};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Reference-table maintenance (host-facing; the engine only reads
    // these tables through ReferenceResolver)
    // ------------------------------------------------------------------

    pub fn insert_attachment(
        &mut self,
        id: AttachmentId,
        mime_type: &str,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO attachments (attachment_id, mime_type, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id.as_bytes().as_slice(), mime_type, now_ms()?],
        )?;
        Ok(())
    }

    pub fn remove_attachment(&mut self, id: AttachmentId) -> Result<bool, StorageError> {
        let n = self.conn.execute(
            "DELETE FROM attachments WHERE attachment_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
        )?;
        Ok(n > 0)
    }

    pub fn insert_term(&mut self, id: TermId, taxonomy: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO terms (term_id, taxonomy) VALUES (?1, ?2)",
            rusqlite::params![id.as_bytes().as_slice(), taxonomy],
        )?;
        Ok(())
    }

    pub fn remove_term(&mut self, id: TermId) -> Result<bool, StorageError> {
        let n = self.conn.execute(
            "DELETE FROM terms WHERE term_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
        )?;
        Ok(n > 0)
    }

    pub fn insert_user(&mut self, id: UserId, display_name: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO users (user_id, display_name) VALUES (?1, ?2)",
            rusqlite::params![id.as_bytes().as_slice(), display_name],
        )?;
        Ok(())
    }

    pub fn remove_user(&mut self, id: UserId) -> Result<bool, StorageError> {
        let n = self.conn.execute(
            "DELETE FROM users WHERE user_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
        )?;
        Ok(n > 0)
    }
}

fn read_entity(row: &rusqlite::Row) -> rusqlite::Result<(Vec<u8>, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn entity_from_parts(
    (id_bytes, schema, title, created_at): (Vec<u8>, String, String, i64),
) -> Result<EntityRecord, StorageError> {
    Ok(EntityRecord {
        entity_id: EntityId::from_bytes(to_array::<16>(id_bytes, "entity_id")?),
        schema,
        title,
        created_at,
    })
}

fn read_backup(row: &rusqlite::Row) -> rusqlite::Result<(Vec<u8>, Vec<u8>, Vec<u8>, i64, Vec<u8>, Vec<u8>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn backup_from_parts(
    (id_bytes, target_bytes, actor_bytes, created_at, checksum_bytes, snapshot): (
        Vec<u8>,
        Vec<u8>,
        Vec<u8>,
        i64,
        Vec<u8>,
        Vec<u8>,
    ),
) -> Result<BackupRecord, StorageError> {
    Ok(BackupRecord {
        backup_id: BackupId::from_bytes(to_array::<16>(id_bytes, "backup_id")?),
        target_entity_id: EntityId::from_bytes(to_array::<16>(target_bytes, "target_entity_id")?),
        actor_id: ActorId::from_bytes(to_array::<16>(actor_bytes, "actor_id")?),
        created_at,
        checksum: to_array::<32>(checksum_bytes, "checksum")?,
        snapshot,
    })
}

impl EntityStore for SqliteStore {
    fn insert_entity(&mut self, record: &EntityRecord) -> Result<(), StorageError> {
        let result = self.conn.execute(
            "INSERT INTO entities (entity_id, schema_key, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                record.entity_id.as_bytes().as_slice(),
                record.schema,
                record.title,
                record.created_at,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::EntityCollision {
                    entity_id: record.entity_id.to_string(),
                })
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn get_entity(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, schema_key, title, created_at FROM entities WHERE entity_id = ?1",
        )?;
        let mut rows = stmt.query_map(
            rusqlite::params![entity_id.as_bytes().as_slice()],
            read_entity,
        )?;
        match rows.next() {
            Some(Ok(parts)) => Ok(Some(entity_from_parts(parts)?)),
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn entities_by_schema(&self, schema: &str) -> Result<Vec<EntityRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, schema_key, title, created_at FROM entities WHERE schema_key = ?1 ORDER BY created_at, entity_id",
        )?;
        let rows = stmt.query_map(rusqlite::params![schema], read_entity)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(entity_from_parts(row?)?);
        }
        Ok(result)
    }

    fn get_fields(&self, entity_id: EntityId) -> Result<Vec<(String, FieldValue)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_key, value FROM fields WHERE entity_id = ?1 ORDER BY field_key")?;
        let rows = stmt.query_map(rusqlite::params![entity_id.as_bytes().as_slice()], |row| {
            let key: String = row.get(0)?;
            let val_bytes: Vec<u8> = row.get(1)?;
            Ok((key, val_bytes))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (key, val_bytes) = row?;
            let value = FieldValue::from_msgpack(&val_bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            result.push((key, value));
        }
        Ok(result)
    }

    fn get_field(
        &self,
        entity_id: EntityId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM fields WHERE entity_id = ?1 AND field_key = ?2")?;
        let mut rows = stmt.query_map(
            rusqlite::params![entity_id.as_bytes().as_slice(), field_key],
            |row| {
                let val_bytes: Vec<u8> = row.get(0)?;
                Ok(val_bytes)
            },
        )?;

        match rows.next() {
            Some(Ok(val_bytes)) => {
                let value = FieldValue::from_msgpack(&val_bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn set_field(
        &mut self,
        entity_id: EntityId,
        field_key: &str,
        value: &FieldValue,
    ) -> Result<(), StorageError> {
        let value_bytes = value
            .to_msgpack()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO fields (entity_id, field_key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id, field_key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![
                entity_id.as_bytes().as_slice(),
                field_key,
                value_bytes,
                now_ms()?,
            ],
        )?;
        Ok(())
    }

    fn clear_field(&mut self, entity_id: EntityId, field_key: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM fields WHERE entity_id = ?1 AND field_key = ?2",
            rusqlite::params![entity_id.as_bytes().as_slice(), field_key],
        )?;
        Ok(())
    }
}

impl ReferenceResolver for SqliteStore {
    fn attachment_exists(&self, id: AttachmentId) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attachments WHERE attachment_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn entity_exists(&self, id: EntityId) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE entity_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn taxonomy_exists(&self, taxonomy: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM terms WHERE taxonomy = ?1",
            rusqlite::params![taxonomy],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn term_exists(&self, taxonomy: &str, id: TermId) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM terms WHERE term_id = ?1 AND taxonomy = ?2",
            rusqlite::params![id.as_bytes().as_slice(), taxonomy],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn user_exists(&self, id: UserId) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE user_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl BackupStore for SqliteStore {
    fn insert_backup(&mut self, record: &BackupRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO backups (backup_id, target_entity_id, actor_id, created_at, checksum, snapshot) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.backup_id.as_bytes().as_slice(),
                record.target_entity_id.as_bytes().as_slice(),
                record.actor_id.as_bytes().as_slice(),
                record.created_at,
                record.checksum.as_slice(),
                record.snapshot,
            ],
        )?;
        Ok(())
    }

    fn get_backup(&self, id: BackupId) -> Result<Option<BackupRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT backup_id, target_entity_id, actor_id, created_at, checksum, snapshot FROM backups WHERE backup_id = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![id.as_bytes().as_slice()], read_backup)?;
        match rows.next() {
            Some(Ok(parts)) => Ok(Some(backup_from_parts(parts)?)),
            Some(Err(e)) => Err(StorageError::Sqlite(e)),
            None => Ok(None),
        }
    }

    fn delete_backup(&mut self, id: BackupId) -> Result<bool, StorageError> {
        let n = self.conn.execute(
            "DELETE FROM backups WHERE backup_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
        )?;
        Ok(n > 0)
    }

    fn list_backups(&self, target: EntityId) -> Result<Vec<BackupRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT backup_id, target_entity_id, actor_id, created_at, checksum, snapshot FROM backups
             WHERE target_entity_id = ?1 ORDER BY created_at DESC, backup_id DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![target.as_bytes().as_slice()], read_backup)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(backup_from_parts(row?)?);
        }
        Ok(result)
    }

    fn delete_backups_before(&mut self, cutoff_ms: i64) -> Result<u64, StorageError> {
        let n = self.conn.execute(
            "DELETE FROM backups WHERE created_at < ?1",
            rusqlite::params![cutoff_ms],
        )?;
        Ok(n as u64)
    }

    fn backup_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM backups", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn delete_oldest_backups(&mut self, excess: u64) -> Result<u64, StorageError> {
        let n = self.conn.execute(
            "DELETE FROM backups WHERE backup_id IN (
                 SELECT backup_id FROM backups ORDER BY created_at ASC, backup_id ASC LIMIT ?1
             )",
            rusqlite::params![excess as i64],
        )?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entity_id: EntityId, schema: &str, title: &str) -> EntityRecord {
        EntityRecord {
            entity_id,
            schema: schema.into(),
            title: title.into(),
            created_at: now_ms().unwrap(),
        }
    }

    #[test]
    fn field_upsert_overwrites() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.insert_entity(&record(id, "catalog", "a")).unwrap();

        store.set_field(id, "fld_price", &FieldValue::Integer(10)).unwrap();
        store.set_field(id, "fld_price", &FieldValue::Integer(42)).unwrap();

        assert_eq!(
            store.get_field(id, "fld_price").unwrap(),
            Some(FieldValue::Integer(42))
        );
    }

    #[test]
    fn entity_collision_reported() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = EntityId::new();
        store.insert_entity(&record(id, "catalog", "a")).unwrap();
        let err = store.insert_entity(&record(id, "catalog", "b")).unwrap_err();
        assert!(matches!(err, StorageError::EntityCollision { .. }));
    }

    #[test]
    fn backups_list_newest_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let target = EntityId::new();
        let actor = ActorId::new();
        for (i, created_at) in [(0u8, 100i64), (1, 200), (2, 300)] {
            store
                .insert_backup(&BackupRecord {
                    backup_id: BackupId::new(),
                    target_entity_id: target,
                    actor_id: actor,
                    created_at,
                    checksum: [i; 32],
                    snapshot: vec![i],
                })
                .unwrap();
        }

        let listed = store.list_backups(target).unwrap();
        let stamps: Vec<i64> = listed.iter().map(|b| b.created_at).collect();
        assert_eq!(stamps, vec![300, 200, 100]);
    }

    #[test]
    fn oldest_excess_deleted_in_creation_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let target = EntityId::new();
        let actor = ActorId::new();
        for created_at in [100i64, 200, 300] {
            store
                .insert_backup(&BackupRecord {
                    backup_id: BackupId::new(),
                    target_entity_id: target,
                    actor_id: actor,
                    created_at,
                    checksum: [0; 32],
                    snapshot: Vec::new(),
                })
                .unwrap();
        }

        assert_eq!(store.delete_oldest_backups(1).unwrap(), 1);
        let remaining: Vec<i64> = store
            .list_backups(target)
            .unwrap()
            .iter()
            .map(|b| b.created_at)
            .collect();
        assert_eq!(remaining, vec![300, 200]);
    }

    #[test]
    fn reopen_preserves_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.db");
        let path = path.to_str().unwrap();
        let target = EntityId::new();
        let backup_id = BackupId::new();

        {
            let mut store = SqliteStore::open(path).unwrap();
            store
                .insert_backup(&BackupRecord {
                    backup_id,
                    target_entity_id: target,
                    actor_id: ActorId::new(),
                    created_at: 42,
                    checksum: [7; 32],
                    snapshot: vec![1, 2, 3],
                })
                .unwrap();
        }

        let store = SqliteStore::open(path).unwrap();
        let loaded = store.get_backup(backup_id).unwrap().unwrap();
        assert_eq!(loaded.snapshot, vec![1, 2, 3]);
        assert_eq!(loaded.checksum, [7; 32]);
    }
}
