//! Dynamic form step: turns a claim type schema into a form view and a
//! submitted snapshot back into a claim submission.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::Result,
    schema::{ClaimTypeSchema, FieldDefinition, FieldKind, Icon, SchemaCatalogue},
    submission::{Attachment, ClaimSubmission},
    validation::ValidationResult,
};

/// Names of the hidden context fields embedded in every claim form.
pub mod context_fields {
    pub const CLAIM_TYPE: &str = "tipo_formulario";
    pub const POLICY_RECORD_ID: &str = "poliza_record_id";
    pub const PLATE: &str = "patente";
    pub const NATIONAL_ID: &str = "dni";

    pub const ALL: [&str; 4] = [CLAIM_TYPE, POLICY_RECORD_ID, PLATE, NATIONAL_ID];
}

pub const SELECT_PLACEHOLDER: &str = "-- Seleccioná --";
pub const TEXTAREA_PLACEHOLDER: &str = "Describí lo sucedido con el mayor detalle posible...";
pub const FILE_ACCEPT: &str = "image/*";
pub const FILE_HINT: &str = "Podés subir varias fotos";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormControl {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub placeholder: Option<String>,
    pub options: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub accept: Option<String>,
    pub multiple: bool,
    pub hint: Option<String>,
}

impl FormControl {
    fn from_definition(field: &FieldDefinition) -> Self {
        let mut control = Self {
            id: field.id.clone(),
            label: field.label.clone(),
            kind: field.kind,
            required: field.required,
            placeholder: field.placeholder.clone(),
            options: Vec::new(),
            min: None,
            max: None,
            accept: None,
            multiple: false,
            hint: None,
        };

        match field.kind {
            FieldKind::File => {
                control.accept = Some(FILE_ACCEPT.to_string());
                control.multiple = true;
                control.hint = Some(FILE_HINT.to_string());
                control.placeholder = None;
            }
            FieldKind::Select => {
                control.options = field
                    .options
                    .iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect();
                control.placeholder = Some(SELECT_PLACEHOLDER.to_string());
            }
            FieldKind::Textarea => {
                control.placeholder = Some(
                    field
                        .placeholder
                        .clone()
                        .unwrap_or_else(|| TEXTAREA_PLACEHOLDER.to_string()),
                );
            }
            FieldKind::Number => {
                control.min = field.min;
                control.max = field.max;
            }
            FieldKind::Checkbox => control.placeholder = None,
            _ => {}
        }

        control
    }
}

/// Everything needed to draw the claim form for one claim type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormView {
    pub slug: String,
    pub title: String,
    pub icon: Icon,
    pub color: Option<String>,
    pub hidden: Vec<HiddenField>,
    pub controls: Vec<FormControl>,
}

/// Renders the form for `slug`. The slug must exist in the catalogue: the menu
/// only offers catalogue entries, so a miss is a contract violation.
pub fn render_form(
    catalogue: &SchemaCatalogue,
    slug: &str,
    validation: &ValidationResult,
) -> Result<FormView> {
    let schema = catalogue.require(slug)?;

    let hidden = vec![
        HiddenField {
            name: context_fields::CLAIM_TYPE.to_string(),
            value: slug.to_string(),
        },
        HiddenField {
            name: context_fields::POLICY_RECORD_ID.to_string(),
            value: validation.policy_record_id.clone().unwrap_or_default(),
        },
        HiddenField {
            name: context_fields::PLATE.to_string(),
            value: validation.plate.clone(),
        },
        HiddenField {
            name: context_fields::NATIONAL_ID.to_string(),
            value: validation.national_id.clone(),
        },
    ];

    Ok(FormView {
        slug: slug.to_string(),
        title: schema.title.clone(),
        icon: Icon::parse(&schema.icon),
        color: schema.color.clone(),
        hidden,
        controls: schema
            .fields
            .iter()
            .map(FormControl::from_definition)
            .collect(),
    })
}

/// A single submitted value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Files(Vec<Attachment>),
}

impl FieldValue {
    fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Flag(checked) => !checked,
            FieldValue::Files(files) => !files.iter().any(Attachment::is_present),
        }
    }
}

/// Values of a submitted form, in the order the controls produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSnapshot {
    entries: Vec<(String, FieldValue)>,
}

impl FormSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, FieldValue::Text(value.into()));
        self
    }

    pub fn flag(mut self, name: impl Into<String>, checked: bool) -> Self {
        self.push(name, FieldValue::Flag(checked));
        self
    }

    pub fn file(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.push_file(name, attachment);
        self
    }

    /// Appends a value; several files under one name collect into one entry.
    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        if let FieldValue::Files(files) = value {
            for file in files {
                self.push_file(name.clone(), file);
            }
            return;
        }
        self.entries.push((name, value));
    }

    pub fn push_file(&mut self, name: impl Into<String>, attachment: Attachment) {
        let name = name.into();
        let existing = self
            .entries
            .iter_mut()
            .find(|(n, v)| *n == name && matches!(v, FieldValue::Files(_)))
            .map(|(_, v)| v);
        if let Some(FieldValue::Files(files)) = existing {
            files.push(attachment);
            return;
        }
        self.entries.push((name, FieldValue::Files(vec![attachment])));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    NotANumber,
    OutOfRange,
    NotAnOption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field_id: String,
    pub kind: IssueKind,
}

/// Checks required fields, numeric bounds and select options, in catalogue
/// order.
pub fn check_completeness(schema: &ClaimTypeSchema, snapshot: &FormSnapshot) -> Vec<FieldIssue> {
    let mut issues = Vec::new();

    for field in &schema.fields {
        let value = snapshot.get(&field.id);
        let empty = value.is_none_or(FieldValue::is_empty);

        if empty {
            if field.required {
                issues.push(FieldIssue {
                    field_id: field.id.clone(),
                    kind: IssueKind::Missing,
                });
            }
            continue;
        }

        if let (FieldKind::Number, Some(FieldValue::Text(raw))) = (field.kind, value) {
            match raw.trim().parse::<f64>() {
                Err(_) => issues.push(FieldIssue {
                    field_id: field.id.clone(),
                    kind: IssueKind::NotANumber,
                }),
                Ok(n) if field.min.is_some_and(|min| n < min)
                    || field.max.is_some_and(|max| n > max) =>
                {
                    issues.push(FieldIssue {
                        field_id: field.id.clone(),
                        kind: IssueKind::OutOfRange,
                    })
                }
                Ok(_) => {}
            }
        }

        if let (FieldKind::Select, Some(FieldValue::Text(raw))) = (field.kind, value) {
            let chosen = raw.trim();
            if !field.options.is_empty() && !field.options.iter().any(|o| o.trim() == chosen) {
                issues.push(FieldIssue {
                    field_id: field.id.clone(),
                    kind: IssueKind::NotAnOption,
                });
            }
        }
    }

    issues
}

/// Splits a snapshot into context fields, attachments and the `datos` blob.
/// Context values are always taken from the confirmed validation so the
/// submission cannot be pointed at another policy.
pub fn build_submission(
    slug: &str,
    validation: &ValidationResult,
    snapshot: &FormSnapshot,
) -> ClaimSubmission {
    let mut data = Map::new();
    let mut attachments = Vec::new();

    for (name, value) in snapshot.entries() {
        if context_fields::ALL.contains(&name) {
            continue;
        }
        match value {
            FieldValue::Files(files) => attachments.extend(
                files
                    .iter()
                    .filter(|f| f.is_present())
                    .map(|f| (name.to_string(), f.clone())),
            ),
            FieldValue::Text(text) => {
                data.insert(name.to_string(), Value::String(text.clone()));
            }
            FieldValue::Flag(checked) => {
                data.insert(name.to_string(), Value::Bool(*checked));
            }
        }
    }

    ClaimSubmission {
        claim_type: slug.to_string(),
        policy_record_id: validation.policy_record_id.clone().unwrap_or_default(),
        national_id: validation.national_id.clone(),
        plate: validation.plate.clone(),
        data,
        attachments,
    }
}
