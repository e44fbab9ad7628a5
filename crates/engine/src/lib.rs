pub mod backup;
pub mod conflict;
pub mod error;
pub mod transform;
pub mod walker;

pub use backup::{
    BackupManager, BackupSnapshot, RestoreOutcome, RetentionPolicy, SnapshotField, SweepStats,
};
pub use conflict::{Conflict, SelectionReport};
pub use error::EngineError;
pub use transform::TransformOutput;
pub use walker::{
    AvailableFieldsReport, FieldReport, FieldWalker, GroupReport, SchemaStats, StructuralStats,
};

use graft_core::{
    ids::{ActorId, BackupId, EntityId},
    schema::SchemaRegistry,
};
use graft_storage::{BackupRecord, EntityRecord, EntityStore, SqliteStore};

/// Caller-selected knobs for one clone request.
#[derive(Debug, Clone, Copy)]
pub struct CloneOptions {
    pub overwrite_existing: bool,
    pub create_backup: bool,
    pub copy_references: bool,
    pub validate_data: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            create_backup: true,
            copy_references: true,
            validate_data: true,
        }
    }
}

/// Aggregated result of one clone call. Every requested key ends up in
/// exactly one of `cloned_fields` or `errors`; warnings never affect
/// `success`.
#[derive(Debug)]
pub struct CloneOutcome {
    pub cloned_fields: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub success: bool,
    pub message: String,
    pub backup_id: Option<BackupId>,
}

impl CloneOutcome {
    /// Whole-request rejection: single error, nothing mutated.
    fn rejected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            cloned_fields: Vec::new(),
            errors: vec![error.clone()],
            warnings: Vec::new(),
            success: false,
            message: error,
            backup_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceCandidate {
    pub entity_id: EntityId,
    pub title: String,
    pub stats: SchemaStats,
}

#[derive(Debug, Clone)]
pub struct PreviewField {
    pub key: String,
    pub label: String,
    pub field_type: &'static str,
    pub required: bool,
    pub cloneable: bool,
    pub has_value: bool,
    pub will_overwrite: bool,
    pub stats: Option<StructuralStats>,
}

#[derive(Debug, Clone)]
pub struct PreviewGroup {
    pub key: String,
    pub title: String,
    pub fields: Vec<PreviewField>,
}

/// Read-only combination of the source and target reports with per-field
/// overwrite flags, for selection UIs.
#[derive(Debug, Clone)]
pub struct ClonePreview {
    pub groups: Vec<PreviewGroup>,
    pub warnings: Vec<String>,
    pub source_stats: SchemaStats,
    pub target_stats: SchemaStats,
}

#[derive(Debug)]
pub struct SelectionOutcome {
    pub valid_fields: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
    pub can_proceed: bool,
}

/// Capability check delegated to the host. Consulted for write access on
/// the clone target and to filter source candidates.
pub trait AccessPolicy {
    fn can_edit(&self, actor: ActorId, entity: EntityId) -> bool;
}

/// Policy for embedders that gate access before reaching the engine.
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_edit(&self, _actor: ActorId, _entity: EntityId) -> bool {
        true
    }
}

/// Optional clone lifecycle hooks, injected instead of a global event bus.
/// Neither hook fires for requests rejected during validation.
pub trait CloneObserver {
    fn on_before_clone(&self, source: EntityId, target: EntityId, field_keys: &[String]) {
        let _ = (source, target, field_keys);
    }

    fn on_after_clone(&self, source: EntityId, target: EntityId, outcome: &CloneOutcome) {
        let _ = (source, target, outcome);
    }
}

/// The clone orchestrator: validates a request, snapshots the target,
/// transforms and writes each selected field, and aggregates the outcome.
/// Each call is one synchronous pass; there is no persistent state machine.
pub struct CloneEngine {
    store: SqliteStore,
    registry: Box<dyn SchemaRegistry>,
    policy: Box<dyn AccessPolicy>,
    observer: Option<Box<dyn CloneObserver>>,
    walker: FieldWalker,
    backups: BackupManager,
    clone_without_backup: bool,
}

impl CloneEngine {
    pub fn new(store: SqliteStore, registry: Box<dyn SchemaRegistry>) -> Self {
        Self {
            store,
            registry,
            policy: Box::new(AllowAll),
            observer: None,
            walker: FieldWalker::new(),
            backups: BackupManager::new(RetentionPolicy::default()),
            clone_without_backup: false,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retention(mut self, policy: RetentionPolicy) -> Self {
        self.backups = BackupManager::new(policy);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn CloneObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Opt out of the fail-safe default that aborts a clone when the backup
    /// cannot be written. With `true`, backup failure becomes a warning and
    /// the overwrite proceeds without its safety net.
    pub fn allow_clone_without_backup(mut self, allow: bool) -> Self {
        self.clone_without_backup = allow;
        self
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Direct store access. Callers that write through this must
    /// `invalidate_entity` themselves.
    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    fn require_entity(&self, entity_id: EntityId) -> Result<EntityRecord, EngineError> {
        self.store
            .get_entity(entity_id)?
            .ok_or_else(|| EngineError::EntityNotFound(entity_id.to_string()))
    }

    // ========================================================================
    // Field reports
    // ========================================================================

    pub fn available_fields(
        &mut self,
        entity_id: EntityId,
    ) -> Result<&AvailableFieldsReport, EngineError> {
        let entity = self.require_entity(entity_id)?;
        self.walker
            .report(&self.store, self.registry.as_ref(), &entity)
    }

    pub fn statistics(&mut self, entity_id: EntityId) -> Result<SchemaStats, EngineError> {
        let report = self.available_fields(entity_id)?;
        Ok(walker::statistics(report))
    }

    pub fn invalidate_entity(&mut self, entity_id: EntityId) {
        self.walker.invalidate(entity_id);
    }

    /// Drop all cached reports. Hosts call this when field groups change.
    pub fn invalidate_schema_cache(&mut self) {
        self.walker.invalidate_all();
    }

    // ========================================================================
    // External operations
    // ========================================================================

    /// Same-schema entities the actor may edit, with per-entity statistics.
    pub fn list_source_candidates(
        &mut self,
        schema: &str,
        exclude: Option<EntityId>,
        actor: ActorId,
    ) -> Result<Vec<SourceCandidate>, EngineError> {
        let records = self.store.entities_by_schema(schema)?;
        let mut out = Vec::new();
        for record in records {
            if Some(record.entity_id) == exclude {
                continue;
            }
            if !self.policy.can_edit(actor, record.entity_id) {
                continue;
            }
            let stats = walker::statistics(self.walker.report(
                &self.store,
                self.registry.as_ref(),
                &record,
            )?);
            out.push(SourceCandidate {
                entity_id: record.entity_id,
                title: record.title,
                stats,
            });
        }
        Ok(out)
    }

    /// Read-only combination of both entities' reports with overwrite flags.
    pub fn preview_fields(
        &mut self,
        source_id: EntityId,
        target_id: EntityId,
    ) -> Result<ClonePreview, EngineError> {
        let source = self.require_entity(source_id)?;
        let target = self.require_entity(target_id)?;
        let (source_report, target_report) =
            self.walker
                .report_pair(&self.store, self.registry.as_ref(), &source, &target)?;

        let source_stats = walker::statistics(source_report);
        let target_stats = walker::statistics(target_report);

        let mut groups = Vec::new();
        for group in &source_report.groups {
            let mut fields = Vec::new();
            for key in &group.field_keys {
                let Some(field) = source_report.fields.get(key) else {
                    continue;
                };
                fields.push(PreviewField {
                    key: key.clone(),
                    label: field.descriptor.label.clone(),
                    field_type: field.descriptor.field_type.type_name(),
                    required: field.descriptor.required,
                    cloneable: field.cloneable,
                    has_value: field.has_value(),
                    will_overwrite: target_report
                        .fields
                        .get(key)
                        .is_some_and(|t| t.has_value()),
                    stats: field.stats,
                });
            }
            groups.push(PreviewGroup {
                key: group.key.clone(),
                title: group.title.clone(),
                fields,
            });
        }

        let mut warnings = source_report.warnings.clone();
        warnings.extend(target_report.warnings.iter().cloned());

        Ok(ClonePreview {
            groups,
            warnings,
            source_stats,
            target_stats,
        })
    }

    /// Thin wrapper over the conflict analysis; mutates nothing.
    pub fn validate_selection(
        &mut self,
        source_id: EntityId,
        target_id: EntityId,
        field_keys: &[String],
    ) -> Result<SelectionOutcome, EngineError> {
        let source = self.require_entity(source_id)?;
        let target = self.require_entity(target_id)?;
        if source.schema != target.schema {
            return Ok(SelectionOutcome {
                valid_fields: Vec::new(),
                conflicts: Vec::new(),
                warnings: vec![format!(
                    "source schema '{}' does not match target schema '{}'",
                    source.schema, target.schema
                )],
                can_proceed: false,
            });
        }

        let (source_report, target_report) =
            self.walker
                .report_pair(&self.store, self.registry.as_ref(), &source, &target)?;
        let report = conflict::analyze(source_report, target_report, field_keys);
        let can_proceed = !report.valid_fields.is_empty();
        Ok(SelectionOutcome {
            valid_fields: report.valid_fields,
            conflicts: report.conflicts,
            warnings: report.warnings,
            can_proceed,
        })
    }

    /// Clone the selected fields from source to target. Request-validation
    /// failures reject the whole call with a single error and nothing
    /// mutated; per-field failures are collected and the loop continues.
    pub fn clone_fields(
        &mut self,
        source_id: EntityId,
        target_id: EntityId,
        field_keys: &[String],
        options: &CloneOptions,
        actor: ActorId,
    ) -> Result<CloneOutcome, EngineError> {
        let outcome = self.clone_fields_inner(source_id, target_id, field_keys, options, actor)?;
        tracing::info!(
            %source_id,
            %target_id,
            cloned = outcome.cloned_fields.len(),
            errors = outcome.errors.len(),
            warnings = outcome.warnings.len(),
            "clone finished"
        );
        Ok(outcome)
    }

    fn clone_fields_inner(
        &mut self,
        source_id: EntityId,
        target_id: EntityId,
        field_keys: &[String],
        options: &CloneOptions,
        actor: ActorId,
    ) -> Result<CloneOutcome, EngineError> {
        // Phase 1: request validation.
        if field_keys.is_empty() {
            return Ok(CloneOutcome::rejected("no fields selected"));
        }
        if source_id == target_id {
            return Ok(CloneOutcome::rejected(
                "source and target are the same entity",
            ));
        }
        let Some(source) = self.store.get_entity(source_id)? else {
            return Ok(CloneOutcome::rejected(format!(
                "source entity not found: {source_id}"
            )));
        };
        let Some(target) = self.store.get_entity(target_id)? else {
            return Ok(CloneOutcome::rejected(format!(
                "target entity not found: {target_id}"
            )));
        };
        if source.schema != target.schema {
            return Ok(CloneOutcome::rejected(format!(
                "source schema '{}' does not match target schema '{}'",
                source.schema, target.schema
            )));
        }
        if !self.policy.can_edit(actor, target_id) {
            return Ok(CloneOutcome::rejected(format!(
                "actor {actor} may not edit entity {target_id}"
            )));
        }

        if let Some(observer) = &self.observer {
            observer.on_before_clone(source_id, target_id, field_keys);
        }

        let (source_report, target_report) =
            self.walker
                .report_pair(&self.store, self.registry.as_ref(), &source, &target)?;

        let mut warnings = Vec::new();

        // Phase 2: backup. Failure aborts the clone unless the embedder
        // explicitly opted out of the safety net.
        let mut backup_id = None;
        if options.create_backup {
            match self
                .backups
                .create(&mut self.store, target_report, target_id, field_keys, actor)
            {
                Ok(id) => backup_id = id,
                Err(e) => {
                    if self.clone_without_backup {
                        tracing::warn!("proceeding without backup: {e}");
                        warnings.push(format!("backup creation failed: {e}"));
                    } else {
                        return Ok(CloneOutcome::rejected(format!(
                            "backup creation failed: {e}"
                        )));
                    }
                }
            }
        }

        // Phase 3: per-field loop, in caller-supplied order.
        let mut cloned_fields = Vec::new();
        let mut errors = Vec::new();
        for key in field_keys {
            let Some(field) = source_report.fields.get(key) else {
                errors.push(format!("field '{key}' not found in source"));
                continue;
            };
            let Some(value) = &field.value else {
                errors.push(format!("field '{key}' not found in source"));
                continue;
            };
            if !field.cloneable {
                errors.push(format!("field '{key}' is not cloneable"));
                continue;
            }
            if !options.overwrite_existing
                && target_report.fields.get(key).is_some_and(|t| t.has_value())
            {
                errors.push(format!(
                    "field '{key}' already has a value and overwrite is disabled"
                ));
                continue;
            }

            let output = match transform::transform(value, &field.descriptor, options, &self.store)
            {
                Ok(output) => output,
                Err(e) => {
                    errors.push(format!("failed to process field '{key}': {e}"));
                    continue;
                }
            };
            if options.validate_data
                && let Err(msg) = transform::validate(&output.value, &field.descriptor)
            {
                errors.push(format!("field '{key}': {msg}"));
                continue;
            }

            match self.store.set_field(target_id, key, &output.value) {
                Ok(()) => {
                    cloned_fields.push(key.clone());
                    warnings.extend(output.warnings);
                }
                Err(e) => errors.push(format!("failed to write field '{key}': {e}")),
            }
        }

        // Phase 4: aggregate. The target's cached report is stale now;
        // invalidate synchronously so read-after-write sees fresh data.
        self.walker.invalidate(target_id);

        let success = errors.is_empty();
        let message = format!(
            "Cloned {} field(s) with {} error(s) and {} warning(s)",
            cloned_fields.len(),
            errors.len(),
            warnings.len()
        );
        let outcome = CloneOutcome {
            cloned_fields,
            errors,
            warnings,
            success,
            message,
            backup_id,
        };
        if let Some(observer) = &self.observer {
            observer.on_after_clone(source_id, target_id, &outcome);
        }
        Ok(outcome)
    }

    // ========================================================================
    // Backups
    // ========================================================================

    /// Snapshot the target's current values for the selected keys. Returns
    /// `None` when none of them holds a value.
    pub fn create_backup(
        &mut self,
        target_id: EntityId,
        field_keys: &[String],
        actor: ActorId,
    ) -> Result<Option<BackupId>, EngineError> {
        let target = self.require_entity(target_id)?;
        let report = self
            .walker
            .report(&self.store, self.registry.as_ref(), &target)?;
        self.backups
            .create(&mut self.store, report, target_id, field_keys, actor)
    }

    /// Replay a backup onto its target entity, verbatim.
    pub fn restore_backup(
        &mut self,
        raw_id: &str,
        delete_after: bool,
    ) -> Result<RestoreOutcome, EngineError> {
        let outcome = self.backups.restore(&mut self.store, raw_id, delete_after)?;
        if let Some(target) = outcome.target_entity_id {
            self.walker.invalidate(target);
        }
        Ok(outcome)
    }

    pub fn delete_backup(&mut self, id: BackupId) -> Result<bool, EngineError> {
        self.backups.delete(&mut self.store, id)
    }

    pub fn list_backups(&self, target: EntityId) -> Result<Vec<BackupRecord>, EngineError> {
        self.backups.list(&self.store, target)
    }

    /// Run both retention rules now. Also triggered after every backup
    /// creation.
    pub fn sweep_retention(&mut self) -> Result<SweepStats, EngineError> {
        self.backups.sweep(&mut self.store)
    }
}
