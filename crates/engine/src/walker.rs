use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use graft_core::{
    field_value::{FieldMap, FieldValue},
    ids::EntityId,
    schema::{find_field, FieldDescriptor, FieldType, SchemaRegistry},
};
use graft_storage::{EntityRecord, EntityStore, SqliteStore};

use crate::error::EngineError;

/// Row/sub-field/layout counts for a composite field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralStats {
    pub rows: usize,
    pub sub_fields: usize,
    pub layouts: usize,
}

#[derive(Debug, Clone)]
pub struct FieldReport {
    pub descriptor: FieldDescriptor,
    pub value: Option<FieldValue>,
    pub cloneable: bool,
    pub stats: Option<StructuralStats>,
}

impl FieldReport {
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// One schema field group with the keys of its listed fields, in schema order.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub key: String,
    pub title: String,
    pub field_keys: Vec<String>,
}

/// Everything the engine knows about one entity's schema-defined fields.
/// A field is listed when it has a value or is composite; walk warnings
/// record layout instances that match no configured layout.
#[derive(Debug, Clone)]
pub struct AvailableFieldsReport {
    pub groups: Vec<GroupReport>,
    pub fields: BTreeMap<String, FieldReport>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaStats {
    pub total_groups: usize,
    pub total_fields: usize,
    pub cloneable_fields: usize,
    pub repeater_fields: usize,
    pub group_fields: usize,
    pub fields_with_values: usize,
}

/// Builds and caches per-entity field reports. The cache is the engine's
/// only mutable shared state; every write path invalidates the touched
/// entity before the call returns.
pub struct FieldWalker {
    cache: HashMap<EntityId, AvailableFieldsReport>,
}

impl FieldWalker {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    pub fn report(
        &mut self,
        store: &SqliteStore,
        registry: &dyn SchemaRegistry,
        entity: &EntityRecord,
    ) -> Result<&AvailableFieldsReport, EngineError> {
        match self.cache.entry(entity.entity_id) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let report = build_report(store, registry, entity)?;
                Ok(slot.insert(report))
            }
        }
    }

    /// Reports for two entities at once, so callers can compare them.
    pub fn report_pair(
        &mut self,
        store: &SqliteStore,
        registry: &dyn SchemaRegistry,
        a: &EntityRecord,
        b: &EntityRecord,
    ) -> Result<(&AvailableFieldsReport, &AvailableFieldsReport), EngineError> {
        self.ensure(store, registry, a)?;
        self.ensure(store, registry, b)?;
        Ok((&self.cache[&a.entity_id], &self.cache[&b.entity_id]))
    }

    fn ensure(
        &mut self,
        store: &SqliteStore,
        registry: &dyn SchemaRegistry,
        entity: &EntityRecord,
    ) -> Result<(), EngineError> {
        if !self.cache.contains_key(&entity.entity_id) {
            let report = build_report(store, registry, entity)?;
            self.cache.insert(entity.entity_id, report);
        }
        Ok(())
    }

    pub fn invalidate(&mut self, entity_id: EntityId) {
        if self.cache.remove(&entity_id).is_some() {
            tracing::debug!(%entity_id, "field report cache invalidated");
        }
    }

    /// Drop every cached report. Hosts call this when the schema changes.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }
}

impl Default for FieldWalker {
    fn default() -> Self {
        Self::new()
    }
}

fn build_report(
    store: &SqliteStore,
    registry: &dyn SchemaRegistry,
    entity: &EntityRecord,
) -> Result<AvailableFieldsReport, EngineError> {
    let mut groups = Vec::new();
    let mut fields = BTreeMap::new();
    let mut warnings = Vec::new();

    for group in registry.field_groups(&entity.schema) {
        let mut field_keys = Vec::new();
        for descriptor in group.fields {
            let value = store.get_field(entity.entity_id, &descriptor.key)?;
            // Composite fields are always listed so their structure can be
            // previewed even when empty; everything else needs a value.
            if value.is_none() && !descriptor.field_type.is_composite() {
                continue;
            }
            if let Some(v) = &value {
                collect_layout_warnings(v, &descriptor.field_type, &mut warnings);
            }
            let stats = structural_stats(&descriptor.field_type, value.as_ref());
            let cloneable = descriptor.field_type.is_cloneable();
            field_keys.push(descriptor.key.clone());
            fields.insert(
                descriptor.key.clone(),
                FieldReport {
                    descriptor,
                    value,
                    cloneable,
                    stats,
                },
            );
        }
        groups.push(GroupReport {
            key: group.key,
            title: group.title,
            field_keys,
        });
    }

    Ok(AvailableFieldsReport {
        groups,
        fields,
        warnings,
    })
}

fn structural_stats(field_type: &FieldType, value: Option<&FieldValue>) -> Option<StructuralStats> {
    match field_type {
        FieldType::Repeater { fields } => Some(StructuralStats {
            rows: match value {
                Some(FieldValue::Rows(rows)) => rows.len(),
                _ => 0,
            },
            sub_fields: fields.len(),
            layouts: 0,
        }),
        FieldType::Group { fields } => Some(StructuralStats {
            rows: 0,
            sub_fields: fields.len(),
            layouts: 0,
        }),
        FieldType::LayoutContainer { layouts } => Some(StructuralStats {
            rows: 0,
            sub_fields: layouts.iter().map(|l| l.fields.len()).sum(),
            layouts: match value {
                Some(FieldValue::Layouts(entries)) => entries.len(),
                _ => 0,
            },
        }),
        _ => None,
    }
}

/// Walk a composite value and record every layout instance whose
/// discriminator matches no configured layout, recursively.
fn collect_layout_warnings(value: &FieldValue, field_type: &FieldType, warnings: &mut Vec<String>) {
    match (field_type, value) {
        (FieldType::Repeater { fields }, FieldValue::Rows(rows)) => {
            for row in rows {
                walk_map(row, fields, warnings);
            }
        }
        (FieldType::Group { fields }, FieldValue::Group(map)) => walk_map(map, fields, warnings),
        (FieldType::LayoutContainer { layouts }, FieldValue::Layouts(entries)) => {
            for entry in entries {
                match layouts.iter().find(|l| l.name == entry.layout) {
                    Some(layout) => walk_map(&entry.fields, &layout.fields, warnings),
                    None => warnings.push(format!(
                        "layout configuration not found for: {}",
                        entry.layout
                    )),
                }
            }
        }
        _ => {}
    }
}

fn walk_map(map: &FieldMap, fields: &[FieldDescriptor], warnings: &mut Vec<String>) {
    for (name, value) in map {
        if let Some(sub) = find_field(fields, name) {
            collect_layout_warnings(value, &sub.field_type, warnings);
        }
    }
}

/// Fold a report into the summary counters surfaced to callers.
pub fn statistics(report: &AvailableFieldsReport) -> SchemaStats {
    let mut stats = SchemaStats {
        total_groups: report.groups.len(),
        total_fields: report.fields.len(),
        ..SchemaStats::default()
    };
    for field in report.fields.values() {
        if field.cloneable {
            stats.cloneable_fields += 1;
        }
        if field.value.is_some() {
            stats.fields_with_values += 1;
        }
        match field.descriptor.field_type {
            FieldType::Repeater { .. } => stats.repeater_fields += 1,
            FieldType::Group { .. } => stats.group_fields += 1,
            _ => {}
        }
    }
    stats
}
