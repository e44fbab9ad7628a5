use graft_core::{
    field_value::{FieldMap, FieldValue, LayoutValue},
    schema::{find_field, FieldDescriptor, FieldType, TextFormat},
};
use graft_storage::ReferenceResolver;

use crate::error::EngineError;
use crate::CloneOptions;

/// Result of transforming one source value for the target context.
#[derive(Debug)]
pub struct TransformOutput {
    pub value: FieldValue,
    pub warnings: Vec<String>,
}

/// Convert a source field value into a value safe to write at the target.
/// Never writes; reference revalidation goes through the read-only resolver
/// and is gated on `options.copy_references`.
pub fn transform(
    value: &FieldValue,
    descriptor: &FieldDescriptor,
    options: &CloneOptions,
    refs: &dyn ReferenceResolver,
) -> Result<TransformOutput, EngineError> {
    let mut warnings = Vec::new();
    let value = transform_inner(value, &descriptor.field_type, options, refs, &mut warnings)?;
    Ok(TransformOutput { value, warnings })
}

fn transform_inner(
    value: &FieldValue,
    field_type: &FieldType,
    options: &CloneOptions,
    refs: &dyn ReferenceResolver,
    warnings: &mut Vec<String>,
) -> Result<FieldValue, EngineError> {
    match field_type {
        // Scalars pass through unchanged. Presentation fields are filtered
        // out upstream; if one slips through it also passes untouched.
        FieldType::Text { .. }
        | FieldType::Number { .. }
        | FieldType::Boolean
        | FieldType::Choice { .. }
        | FieldType::Presentation => Ok(value.clone()),

        FieldType::Attachment { .. } => {
            if !options.copy_references {
                return Ok(value.clone());
            }
            match value {
                FieldValue::Attachment(id) => {
                    if refs.attachment_exists(*id)? {
                        Ok(value.clone())
                    } else {
                        warnings.push(format!("Attachment {id} not found"));
                        Ok(FieldValue::Null)
                    }
                }
                FieldValue::Attachments(ids) => {
                    let mut kept = Vec::with_capacity(ids.len());
                    for id in ids {
                        if refs.attachment_exists(*id)? {
                            kept.push(*id);
                        } else {
                            warnings.push(format!("Attachment {id} not found"));
                        }
                    }
                    Ok(FieldValue::Attachments(kept))
                }
                _ => Ok(value.clone()),
            }
        }

        FieldType::EntityRef { .. } => {
            if !options.copy_references {
                return Ok(value.clone());
            }
            match value {
                FieldValue::EntityRef(id) => {
                    if refs.entity_exists(*id)? {
                        Ok(value.clone())
                    } else {
                        warnings.push(format!("Entity {id} not found"));
                        Ok(FieldValue::Null)
                    }
                }
                FieldValue::EntityRefs(ids) => {
                    let mut kept = Vec::with_capacity(ids.len());
                    for id in ids {
                        if refs.entity_exists(*id)? {
                            kept.push(*id);
                        } else {
                            warnings.push(format!("Entity {id} not found"));
                        }
                    }
                    Ok(FieldValue::EntityRefs(kept))
                }
                _ => Ok(value.clone()),
            }
        }

        FieldType::TermRef { taxonomy } => {
            if !options.copy_references {
                return Ok(value.clone());
            }
            match value {
                FieldValue::Terms(ids) => {
                    if !refs.taxonomy_exists(taxonomy)? {
                        warnings.push(format!("Taxonomy {taxonomy} not found"));
                        return Ok(FieldValue::Terms(Vec::new()));
                    }
                    let mut kept = Vec::with_capacity(ids.len());
                    for id in ids {
                        if refs.term_exists(taxonomy, *id)? {
                            kept.push(*id);
                        } else {
                            warnings.push(format!("Term {id} not found in taxonomy {taxonomy}"));
                        }
                    }
                    Ok(FieldValue::Terms(kept))
                }
                _ => Ok(value.clone()),
            }
        }

        FieldType::UserRef { .. } => {
            if !options.copy_references {
                return Ok(value.clone());
            }
            match value {
                FieldValue::Users(ids) => {
                    let mut kept = Vec::with_capacity(ids.len());
                    for id in ids {
                        if refs.user_exists(*id)? {
                            kept.push(*id);
                        } else {
                            warnings.push(format!("User {id} not found"));
                        }
                    }
                    Ok(FieldValue::Users(kept))
                }
                _ => Ok(value.clone()),
            }
        }

        FieldType::Repeater { fields } => match value {
            FieldValue::Rows(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    out.push(transform_map(row, fields, options, refs, warnings)?);
                }
                Ok(FieldValue::Rows(out))
            }
            _ => Ok(value.clone()),
        },

        FieldType::Group { fields } => match value {
            FieldValue::Group(map) => Ok(FieldValue::Group(transform_map(
                map, fields, options, refs, warnings,
            )?)),
            _ => Ok(value.clone()),
        },

        FieldType::LayoutContainer { layouts } => match value {
            FieldValue::Layouts(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for entry in entries {
                    match layouts.iter().find(|l| l.name == entry.layout) {
                        Some(layout) => out.push(LayoutValue {
                            layout: entry.layout.clone(),
                            fields: transform_map(
                                &entry.fields,
                                &layout.fields,
                                options,
                                refs,
                                warnings,
                            )?,
                        }),
                        None => {
                            warnings.push(format!(
                                "layout configuration not found for: {}",
                                entry.layout
                            ));
                            out.push(entry.clone());
                        }
                    }
                }
                Ok(FieldValue::Layouts(out))
            }
            _ => Ok(value.clone()),
        },
    }
}

/// Transform each named sub-value against its descriptor. Names present in
/// the value but absent from the descriptor list pass through unchanged.
fn transform_map(
    map: &FieldMap,
    fields: &[FieldDescriptor],
    options: &CloneOptions,
    refs: &dyn ReferenceResolver,
    warnings: &mut Vec<String>,
) -> Result<FieldMap, EngineError> {
    let mut out = FieldMap::new();
    for (name, value) in map {
        let transformed = match find_field(fields, name) {
            Some(sub) => transform_inner(value, &sub.field_type, options, refs, warnings)?,
            None => value.clone(),
        };
        out.insert(name.clone(), transformed);
    }
    Ok(out)
}

/// Post-transform validation, run when `options.validate_data` is set.
/// Failures here are per-field errors, not warnings.
pub fn validate(value: &FieldValue, descriptor: &FieldDescriptor) -> Result<(), String> {
    if descriptor.required && value.is_empty() {
        return Err(format!("required field '{}' has no value", descriptor.label));
    }

    match &descriptor.field_type {
        FieldType::Text { format } => {
            if let FieldValue::Text(s) = value
                && !s.is_empty()
            {
                match format {
                    TextFormat::Plain => {}
                    TextFormat::Email => {
                        if !looks_like_email(s) {
                            return Err(format!(
                                "field '{}' is not a valid email address",
                                descriptor.label
                            ));
                        }
                    }
                    TextFormat::Url => {
                        if !s.starts_with("http://") && !s.starts_with("https://") {
                            return Err(format!("field '{}' is not a valid URL", descriptor.label));
                        }
                    }
                }
            }
            Ok(())
        }

        FieldType::Number { min, max } => {
            let numeric = match value {
                FieldValue::Integer(n) => Some(*n as f64),
                FieldValue::Float(f) => Some(*f),
                FieldValue::Null => None,
                _ => {
                    return Err(format!("field '{}' expects a numeric value", descriptor.label));
                }
            };
            if let Some(n) = numeric {
                if let Some(min) = min
                    && n < *min
                {
                    return Err(format!(
                        "field '{}' is below the minimum of {min}",
                        descriptor.label
                    ));
                }
                if let Some(max) = max
                    && n > *max
                {
                    return Err(format!(
                        "field '{}' is above the maximum of {max}",
                        descriptor.label
                    ));
                }
            }
            Ok(())
        }

        _ => Ok(()),
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
