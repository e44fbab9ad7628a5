use graft_core::{
    field_value::FieldValue,
    ids::{ActorId, BackupId, EntityId},
    time::{now_ms, MS_PER_DAY},
};
use graft_engine::{BackupSnapshot, CloneEngine, RetentionPolicy};
use graft_harness::{catalog_registry, TestBench};
use graft_storage::{BackupRecord, BackupStore, EntityRecord, EntityStore, SqliteStore};

fn keys(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|k| k.to_string()).collect()
}

fn raw_backup(target: EntityId, created_at: i64) -> BackupRecord {
    BackupRecord {
        backup_id: BackupId::new(),
        target_entity_id: target,
        actor_id: ActorId::new(),
        created_at,
        checksum: [0; 32],
        snapshot: Vec::new(),
    }
}

// ============================================================================
// Create
// ============================================================================

#[test]
fn backup_snapshots_only_fields_with_values() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;
    bench.set_field(target, "fld_summary", FieldValue::Text("present".into()))?;

    let backup_id = bench
        .engine
        .create_backup(target, &keys(&["fld_summary", "fld_price"]), bench.actor)?
        .expect("summary has a value, so a backup must be written");

    let backups = bench.engine.list_backups(target)?;
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].backup_id, backup_id);

    let snapshot = BackupSnapshot::from_msgpack(&backups[0].snapshot)?;
    assert_eq!(snapshot.fields.len(), 1);
    let field = &snapshot.fields["fld_summary"];
    assert_eq!(field.value, FieldValue::Text("present".into()));
    assert_eq!(field.label, "Summary");
    assert_eq!(field.field_type, "text");
    Ok(())
}

#[test]
fn no_backup_when_nothing_has_a_value() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Empty")?;

    let backup_id = bench
        .engine
        .create_backup(target, &keys(&["fld_summary", "fld_price"]), bench.actor)?;
    assert!(backup_id.is_none());
    assert!(bench.engine.list_backups(target)?.is_empty());
    Ok(())
}

// ============================================================================
// Restore
// ============================================================================

#[test]
fn restore_round_trips_bit_for_bit() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;
    let original = bench.seed_attachment()?;
    let replacement = bench.seed_attachment()?;

    let before = FieldValue::Attachments(vec![original]);
    bench.set_field(target, "fld_gallery", before.clone())?;
    let before_bytes = before.to_msgpack()?;

    let backup_id = bench
        .engine
        .create_backup(target, &keys(&["fld_gallery"]), bench.actor)?
        .expect("gallery has a value");

    // Overwrite, then restore.
    bench.set_field(target, "fld_gallery", FieldValue::Attachments(vec![replacement]))?;
    let outcome = bench
        .engine
        .restore_backup(&backup_id.to_string(), false)?;

    assert!(outcome.success);
    assert_eq!(outcome.restored_fields, keys(&["fld_gallery"]));
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.target_entity_id, Some(target));

    let after = bench.get_field(target, "fld_gallery")?.unwrap();
    assert_eq!(after.to_msgpack()?, before_bytes);

    // The record survives when delete_after is false.
    assert_eq!(bench.engine.list_backups(target)?.len(), 1);
    Ok(())
}

#[test]
fn restore_sees_fresh_report_afterwards() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;
    bench.set_field(target, "fld_summary", FieldValue::Text("old".into()))?;

    let backup_id = bench
        .engine
        .create_backup(target, &keys(&["fld_summary"]), bench.actor)?
        .unwrap();
    bench.set_field(target, "fld_summary", FieldValue::Text("new".into()))?;

    // Prime the cache with the post-edit state.
    assert_eq!(
        bench.engine.available_fields(target)?.fields["fld_summary"].value,
        Some(FieldValue::Text("new".into()))
    );

    bench.engine.restore_backup(&backup_id.to_string(), false)?;

    assert_eq!(
        bench.engine.available_fields(target)?.fields["fld_summary"].value,
        Some(FieldValue::Text("old".into()))
    );
    Ok(())
}

#[test]
fn restore_deletes_record_when_asked() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;
    bench.set_field(target, "fld_price", FieldValue::Integer(5))?;

    let backup_id = bench
        .engine
        .create_backup(target, &keys(&["fld_price"]), bench.actor)?
        .unwrap();

    let outcome = bench.engine.restore_backup(&backup_id.to_string(), true)?;
    assert!(outcome.success);
    assert!(bench.engine.list_backups(target)?.is_empty());

    let again = bench.engine.restore_backup(&backup_id.to_string(), false)?;
    assert!(!again.success);
    assert!(again.errors[0].contains("backup not found"));
    Ok(())
}

#[test]
fn malformed_backup_id_rejected_before_lookup() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;

    for raw in ["", "definitely-not-a-uuid", "550e8400-e29b-41d4-a716-446655440000"] {
        let outcome = bench.engine.restore_backup(raw, false)?;
        assert!(!outcome.success);
        assert!(outcome.errors[0].contains("invalid backup id"));
        assert!(outcome.restored_fields.is_empty());
        assert!(outcome.target_entity_id.is_none());
    }
    Ok(())
}

#[test]
fn corrupt_record_refused() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;

    let record = BackupRecord {
        backup_id: BackupId::new(),
        target_entity_id: target,
        actor_id: bench.actor,
        created_at: now_ms()?,
        // Checksum does not match the snapshot bytes.
        checksum: [0xAA; 32],
        snapshot: vec![1, 2, 3],
    };
    bench.engine.store_mut().insert_backup(&record)?;

    let outcome = bench
        .engine
        .restore_backup(&record.backup_id.to_string(), false)?;
    assert!(!outcome.success);
    assert!(outcome.errors[0].contains("corrupt"));
    assert!(outcome.restored_fields.is_empty());
    Ok(())
}

// ============================================================================
// List / delete
// ============================================================================

#[test]
fn list_orders_newest_first() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;
    let other = bench.create_entity("catalog", "Other")?;

    for created_at in [100, 300, 200] {
        bench
            .engine
            .store_mut()
            .insert_backup(&raw_backup(target, created_at))?;
    }
    bench.engine.store_mut().insert_backup(&raw_backup(other, 999))?;

    let listed = bench.engine.list_backups(target)?;
    let stamps: Vec<i64> = listed.iter().map(|b| b.created_at).collect();
    assert_eq!(stamps, vec![300, 200, 100]);
    Ok(())
}

#[test]
fn delete_backup_reports_outcome() -> Result<(), Box<dyn std::error::Error>> {
    let mut bench = TestBench::with_catalog()?;
    let target = bench.create_entity("catalog", "Target")?;
    let record = raw_backup(target, 100);
    bench.engine.store_mut().insert_backup(&record)?;

    assert!(bench.engine.delete_backup(record.backup_id)?);
    assert!(!bench.engine.delete_backup(record.backup_id)?);
    Ok(())
}

// ============================================================================
// Retention
// ============================================================================

fn engine_with_retention(policy: RetentionPolicy) -> Result<CloneEngine, Box<dyn std::error::Error>> {
    let store = SqliteStore::open_in_memory()?;
    Ok(CloneEngine::new(store, Box::new(catalog_registry())).with_retention(policy))
}

#[test]
fn age_rule_deletes_only_expired_records() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = engine_with_retention(RetentionPolicy {
        retention_days: 30,
        max_backups: 0,
    })?;
    let target = EntityId::new();

    engine
        .store_mut()
        .insert_backup(&raw_backup(target, now_ms()? - 31 * MS_PER_DAY))?;
    engine.store_mut().insert_backup(&raw_backup(target, now_ms()?))?;

    let stats = engine.sweep_retention()?;
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.excess, 0);

    let remaining = engine.list_backups(target)?;
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].created_at > now_ms()? - MS_PER_DAY);
    Ok(())
}

#[test]
fn count_rule_deletes_exactly_the_oldest_excess() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = engine_with_retention(RetentionPolicy {
        retention_days: 0,
        max_backups: 2,
    })?;
    let target = EntityId::new();

    for created_at in [100, 200, 300] {
        engine.store_mut().insert_backup(&raw_backup(target, created_at))?;
    }

    let stats = engine.sweep_retention()?;
    assert_eq!(stats.expired, 0);
    assert_eq!(stats.excess, 1);

    let stamps: Vec<i64> = engine
        .list_backups(target)?
        .iter()
        .map(|b| b.created_at)
        .collect();
    assert_eq!(stamps, vec![300, 200]);
    Ok(())
}

#[test]
fn creating_a_backup_triggers_the_sweep() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = engine_with_retention(RetentionPolicy {
        retention_days: 0,
        max_backups: 1,
    })?;
    let target = EntityId::new();
    engine.store_mut().insert_entity(&EntityRecord {
        entity_id: target,
        schema: "catalog".into(),
        title: "Target".into(),
        created_at: now_ms()?,
    })?;
    engine
        .store_mut()
        .set_field(target, "fld_summary", &FieldValue::Text("v".into()))?;

    let actor = ActorId::new();
    let first = engine
        .create_backup(target, &keys(&["fld_summary"]), actor)?
        .unwrap();
    // Distinct creation timestamps keep the sweep's oldest-first order
    // unambiguous.
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = engine
        .create_backup(target, &keys(&["fld_summary"]), actor)?
        .unwrap();

    // The cap is one record, so creating the second sweeps the first away.
    let listed = engine.list_backups(target)?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].backup_id, second);
    assert_ne!(first, second);
    Ok(())
}

// ============================================================================
// Durability
// ============================================================================

#[test]
fn backups_survive_reopening_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graft.db");
    let path = path.to_str().expect("utf-8 temp path");

    let target = EntityId::new();
    let actor = ActorId::new();
    let backup_id;
    {
        let store = SqliteStore::open(path)?;
        let mut engine = CloneEngine::new(store, Box::new(catalog_registry()));
        engine.store_mut().insert_entity(&EntityRecord {
            entity_id: target,
            schema: "catalog".into(),
            title: "Durable".into(),
            created_at: now_ms()?,
        })?;
        engine
            .store_mut()
            .set_field(target, "fld_summary", &FieldValue::Text("original".into()))?;
        backup_id = engine
            .create_backup(target, &keys(&["fld_summary"]), actor)?
            .unwrap();
        engine
            .store_mut()
            .set_field(target, "fld_summary", &FieldValue::Text("clobbered".into()))?;
    }

    let store = SqliteStore::open(path)?;
    let mut engine = CloneEngine::new(store, Box::new(catalog_registry()));
    let outcome = engine.restore_backup(&backup_id.to_string(), false)?;
    assert!(outcome.success);
    assert_eq!(
        engine.store().get_field(target, "fld_summary")?,
        Some(FieldValue::Text("original".into()))
    );
    Ok(())
}
