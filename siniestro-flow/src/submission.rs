use std::fmt;

use dashmap::DashSet;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};

/// An uploaded file. Empty slots (no name or no bytes) are kept in the
/// snapshot but never forwarded.
#[derive(Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub fn is_present(&self) -> bool {
        !self.file_name.is_empty() && !self.bytes.is_empty()
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Payload of one claim creation call. Lives only for the duration of the
/// request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimSubmission {
    pub claim_type: String,
    pub policy_record_id: String,
    pub national_id: String,
    pub plate: String,
    /// Scalar field values keyed by field id, sent as the `datos` part.
    pub data: Map<String, Value>,
    /// `(field id, file)` pairs in submission order.
    pub attachments: Vec<(String, Attachment)>,
}

pub const CASE_ID_PLACEHOLDER: &str = "N/A";

/// Body of a successful `POST /api/create-siniestro`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimCreated {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

impl ClaimCreated {
    pub fn case_id(&self) -> &str {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(CASE_ID_PLACEHOLDER)
    }

    pub fn confirmation(&self) -> String {
        format!(
            "Hemos recibido los datos y tu número de gestión es #{}. Un asesor procesará tu denuncia y te contactará a la brevedad.",
            self.case_id()
        )
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Validation,
    Submission,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Validation => "validation",
            Operation::Submission => "submission",
        }
    }
}

/// Per-session record of requests currently in flight. Holding a
/// [`InFlightPermit`] is the equivalent of a disabled submit control.
#[derive(Debug, Default)]
pub struct InFlight {
    active: DashSet<(String, Operation)>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, session_id: &str, op: Operation) -> Result<InFlightPermit<'_>> {
        if !self.active.insert((session_id.to_string(), op)) {
            return Err(FlowError::Busy(op.name()));
        }
        Ok(InFlightPermit {
            owner: self,
            key: (session_id.to_string(), op),
        })
    }

    pub fn is_active(&self, session_id: &str, op: Operation) -> bool {
        self.active.contains(&(session_id.to_string(), op))
    }
}

/// Released on drop, whatever the outcome of the guarded request.
#[derive(Debug)]
pub struct InFlightPermit<'a> {
    owner: &'a InFlight,
    key: (String, Operation),
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.owner.active.remove(&self.key);
    }
}
