use crate::walker::AvailableFieldsReport;

/// A selected field that already holds a value at the target. Conflicts are
/// informational; the overwrite decision happens at execution time.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub field_key: String,
    pub label: String,
    pub field_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionReport {
    pub valid_fields: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
}

/// Classify a selection against the source and target reports, preserving
/// the caller-supplied key order.
pub fn analyze(
    source: &AvailableFieldsReport,
    target: &AvailableFieldsReport,
    field_keys: &[String],
) -> SelectionReport {
    let mut report = SelectionReport::default();

    for key in field_keys {
        let Some(src) = source.fields.get(key) else {
            report
                .warnings
                .push(format!("field '{key}' not found in source"));
            continue;
        };
        if !src.cloneable {
            report
                .warnings
                .push(format!("field '{key}' is not cloneable"));
            continue;
        }
        report.valid_fields.push(key.clone());

        if let Some(tgt) = target.fields.get(key)
            && tgt.has_value()
        {
            report.conflicts.push(Conflict {
                field_key: key.clone(),
                label: tgt.descriptor.label.clone(),
                field_type: tgt.descriptor.field_type.type_name(),
            });
        }
    }

    report
}
