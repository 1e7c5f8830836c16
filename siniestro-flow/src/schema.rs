use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FlowError, Result};

/// Input kind of a single form field as declared by the backend catalogue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Date,
    Time,
    Number,
    Select,
    Checkbox,
    File,
    Email,
    #[serde(alias = "phone")]
    Tel,
    /// Anything the backend sends that this client does not know yet;
    /// rendered as single-line text.
    #[default]
    #[serde(other)]
    Unknown,
}

impl FieldKind {
    /// Kinds whose values travel as attachments instead of inside `datos`.
    pub fn is_file(self) -> bool {
        matches!(self, FieldKind::File)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: FieldKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

// Catalogue rows are edited by hand upstream; blank cells arrive as null.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTypeSchema {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "icono", default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "campos", default)]
    pub fields: Vec<FieldDefinition>,
}

impl ClaimTypeSchema {
    fn check_unique_ids(&self, slug: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.id.trim().is_empty() {
                return Err(FlowError::InvalidSchema(format!(
                    "claim type '{slug}' has a field without id"
                )));
            }
            if !seen.insert(field.id.as_str()) {
                return Err(FlowError::InvalidSchema(format!(
                    "claim type '{slug}' declares field '{}' twice",
                    field.id
                )));
            }
        }
        Ok(())
    }
}

/// Icon reference: either an icon-font class (`fa-car`) or a literal glyph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Icon {
    FontClass(String),
    Glyph(String),
}

impl Icon {
    pub fn parse(raw: &str) -> Self {
        if raw.contains("fa-") {
            Icon::FontClass(raw.to_string())
        } else {
            Icon::Glyph(raw.to_string())
        }
    }
}

/// One selectable entry of the claim type menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub slug: String,
    pub title: String,
    pub icon: Icon,
    pub color: Option<String>,
}

/// Mapping of claim type slug to its form definition, in catalogue order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCatalogue(IndexMap<String, ClaimTypeSchema>);

impl SchemaCatalogue {
    pub fn new(entries: IndexMap<String, ClaimTypeSchema>) -> Result<Self> {
        for (slug, schema) in &entries {
            schema.check_unique_ids(slug)?;
        }
        Ok(Self(entries))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let entries: IndexMap<String, ClaimTypeSchema> = serde_json::from_slice(bytes)
            .map_err(|e| FlowError::InvalidSchema(e.to_string()))?;
        Self::new(entries)
    }

    pub fn get(&self, slug: &str) -> Option<&ClaimTypeSchema> {
        self.0.get(slug)
    }

    pub fn require(&self, slug: &str) -> Result<&ClaimTypeSchema> {
        self.get(slug)
            .ok_or_else(|| FlowError::ClaimTypeNotFound(slug.to_string()))
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn menu(&self) -> Vec<MenuEntry> {
        self.0
            .iter()
            .map(|(slug, schema)| MenuEntry {
                slug: slug.clone(),
                title: schema.title.clone(),
                icon: Icon::parse(&schema.icon),
                color: schema.color.clone(),
            })
            .collect()
    }
}
