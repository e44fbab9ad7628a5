use std::collections::HashMap;

use graft_core::{
    field_value::FieldValue,
    ids::{ActorId, AttachmentId, EntityId, TermId, UserId},
    schema::{
        FieldDescriptor, FieldGroup, FieldType, LayoutDescriptor, SchemaRegistry, TextFormat,
    },
    time::now_ms,
};
use graft_engine::CloneEngine;
use graft_storage::{EntityRecord, EntityStore, SqliteStore, StorageError};

/// In-memory field-group registry for tests and embedding experiments.
#[derive(Default, Clone)]
pub struct MemoryRegistry {
    groups: HashMap<String, Vec<FieldGroup>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, schema: &str, group: FieldGroup) {
        self.groups
            .entry(schema.to_string())
            .or_default()
            .push(group);
    }
}

impl SchemaRegistry for MemoryRegistry {
    fn field_groups(&self, schema: &str) -> Vec<FieldGroup> {
        self.groups.get(schema).cloned().unwrap_or_default()
    }
}

/// A clone engine over an in-memory store plus seed helpers.
pub struct TestBench {
    pub engine: CloneEngine,
    pub actor: ActorId,
}

impl TestBench {
    pub fn new(registry: MemoryRegistry) -> Result<Self, StorageError> {
        let store = SqliteStore::open_in_memory()?;
        Ok(Self {
            engine: CloneEngine::new(store, Box::new(registry)),
            actor: ActorId::new(),
        })
    }

    /// Bench preloaded with the `catalog` fixture schema.
    pub fn with_catalog() -> Result<Self, StorageError> {
        Self::new(catalog_registry())
    }

    pub fn create_entity(
        &mut self,
        schema: &str,
        title: &str,
    ) -> Result<EntityId, Box<dyn std::error::Error>> {
        let entity_id = EntityId::new();
        self.engine.store_mut().insert_entity(&EntityRecord {
            entity_id,
            schema: schema.into(),
            title: title.into(),
            created_at: now_ms()?,
        })?;
        Ok(entity_id)
    }

    pub fn set_field(
        &mut self,
        entity_id: EntityId,
        field_key: &str,
        value: FieldValue,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.engine.store_mut().set_field(entity_id, field_key, &value)?;
        self.engine.invalidate_entity(entity_id);
        Ok(())
    }

    pub fn get_field(
        &self,
        entity_id: EntityId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, Box<dyn std::error::Error>> {
        Ok(self.engine.store().get_field(entity_id, field_key)?)
    }

    pub fn seed_attachment(&mut self) -> Result<AttachmentId, Box<dyn std::error::Error>> {
        let id = AttachmentId::new();
        self.engine.store_mut().insert_attachment(id, "image/jpeg")?;
        Ok(id)
    }

    pub fn remove_attachment(&mut self, id: AttachmentId) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(self.engine.store_mut().remove_attachment(id)?)
    }

    pub fn seed_term(&mut self, taxonomy: &str) -> Result<TermId, Box<dyn std::error::Error>> {
        let id = TermId::new();
        self.engine.store_mut().insert_term(id, taxonomy)?;
        Ok(id)
    }

    pub fn seed_user(&mut self, display_name: &str) -> Result<UserId, Box<dyn std::error::Error>> {
        let id = UserId::new();
        self.engine.store_mut().insert_user(id, display_name)?;
        Ok(id)
    }

    pub fn remove_user(&mut self, id: UserId) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(self.engine.store_mut().remove_user(id)?)
    }
}

fn field(name: &str, label: &str, field_type: FieldType) -> FieldDescriptor {
    FieldDescriptor {
        key: format!("fld_{name}"),
        name: name.into(),
        label: label.into(),
        required: false,
        field_type,
    }
}

/// The fixture schema used across the integration suites: scalars,
/// references, and all three composite kinds under the `catalog` schema id.
pub fn catalog_schema() -> Vec<FieldGroup> {
    let mut summary = field(
        "summary",
        "Summary",
        FieldType::Text {
            format: TextFormat::Plain,
        },
    );
    summary.required = true;

    vec![
        FieldGroup {
            key: "grp_main".into(),
            title: "Main".into(),
            fields: vec![
                field(
                    "price",
                    "Price",
                    FieldType::Number {
                        min: Some(0.0),
                        max: Some(10_000.0),
                    },
                ),
                summary,
                field(
                    "website",
                    "Website",
                    FieldType::Text {
                        format: TextFormat::Url,
                    },
                ),
                field(
                    "contact",
                    "Contact",
                    FieldType::Text {
                        format: TextFormat::Email,
                    },
                ),
                field("in_stock", "In stock", FieldType::Boolean),
                field(
                    "badges",
                    "Badges",
                    FieldType::Choice {
                        options: vec!["new".into(), "sale".into(), "featured".into()],
                        multiple: true,
                    },
                ),
            ],
        },
        FieldGroup {
            key: "grp_media".into(),
            title: "Media".into(),
            fields: vec![
                field("cover", "Cover", FieldType::Attachment { multiple: false }),
                field("gallery", "Gallery", FieldType::Attachment { multiple: true }),
            ],
        },
        FieldGroup {
            key: "grp_structure".into(),
            title: "Structure".into(),
            fields: vec![
                field(
                    "sections",
                    "Sections",
                    FieldType::Repeater {
                        fields: vec![
                            field("image", "Image", FieldType::Attachment { multiple: false }),
                            field(
                                "caption",
                                "Caption",
                                FieldType::Text {
                                    format: TextFormat::Plain,
                                },
                            ),
                        ],
                    },
                ),
                field(
                    "hero",
                    "Hero",
                    FieldType::Group {
                        fields: vec![
                            field(
                                "headline",
                                "Headline",
                                FieldType::Text {
                                    format: TextFormat::Plain,
                                },
                            ),
                            field("banner", "Banner", FieldType::Attachment { multiple: false }),
                        ],
                    },
                ),
                field(
                    "blocks",
                    "Blocks",
                    FieldType::LayoutContainer {
                        layouts: vec![
                            LayoutDescriptor {
                                name: "quote".into(),
                                label: "Quote".into(),
                                fields: vec![field(
                                    "body",
                                    "Body",
                                    FieldType::Text {
                                        format: TextFormat::Plain,
                                    },
                                )],
                            },
                            LayoutDescriptor {
                                name: "gallery_row".into(),
                                label: "Gallery row".into(),
                                fields: vec![field(
                                    "images",
                                    "Images",
                                    FieldType::Attachment { multiple: true },
                                )],
                            },
                        ],
                    },
                ),
            ],
        },
        FieldGroup {
            key: "grp_relations".into(),
            title: "Relations".into(),
            fields: vec![
                field("related", "Related", FieldType::EntityRef { multiple: true }),
                field(
                    "topics",
                    "Topics",
                    FieldType::TermRef {
                        taxonomy: "topics".into(),
                    },
                ),
                field("reviewers", "Reviewers", FieldType::UserRef { multiple: true }),
                field("admin_note", "Admin note", FieldType::Presentation),
            ],
        },
    ]
}

pub fn catalog_registry() -> MemoryRegistry {
    let mut registry = MemoryRegistry::new();
    for group in catalog_schema() {
        registry.add_group("catalog", group);
    }
    registry
}
