use std::time::Duration;

use thiserror::Error;

/// User-facing messages shown by the intake flow.
pub mod messages {
    pub const INCOMPLETE_DATA: &str =
        "Por favor revisá los datos ingresados (DNI o Patente incompletos).";
    pub const COVERAGE_NOT_CONFIRMED: &str = "No logramos validar tu cobertura.";
    pub const VALIDATION_UNREACHABLE: &str =
        "No pudimos verificar tu cobertura. Por favor intentá nuevamente.";
    pub const VALIDATION_TIMEOUT: &str =
        "La verificación está demorando demasiado. Por favor intentá nuevamente en unos minutos.";
    pub const VALIDATION_REJECTED: &str = "Error en validación";
    pub const CONFIGURATION_UNAVAILABLE: &str =
        "Error cargando la configuración del sistema. Por favor recarga la página.";
    pub const MISSING_FIELDS: &str = "Completá los campos obligatorios marcados.";
    pub const CONNECTION_ERROR: &str = "Error de conexión";
}

/// Errors raised by the transport towards the claims backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned status {status}")]
    Status { status: u16, detail: Option<String> },

    #[error("malformed backend response: {0}")]
    Decode(String),

    #[error("failed to read local document: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Human readable reason supplied by the backend, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            BackendError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("incomplete identification data")]
    IncompleteData,

    #[error("coverage not confirmed: {0}")]
    CoverageRejected(String),

    #[error("validation request failed: {0}")]
    ValidationFailed(#[source] BackendError),

    #[error("claim submission failed: {0}")]
    SubmissionFailed(#[source] BackendError),

    #[error("required fields missing or invalid: {}", .0.join(", "))]
    InvalidFields(Vec<String>),

    #[error("form configuration unavailable")]
    ConfigurationUnavailable,

    #[error("malformed form configuration: {0}")]
    InvalidSchema(String),

    #[error("claim type not found in catalogue: {0}")]
    ClaimTypeNotFound(String),

    #[error("no confirmed validation in session")]
    NotValidated,

    #[error("event {event} is not allowed at step {step}")]
    InvalidTransition { step: String, event: String },

    #[error("a {0} request is already in flight")]
    Busy(&'static str),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FlowError {
    /// Message suitable for display to the person filling in the flow.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::IncompleteData => messages::INCOMPLETE_DATA.to_string(),
            FlowError::CoverageRejected(reason) => reason.clone(),
            FlowError::ValidationFailed(BackendError::Timeout(_)) => {
                messages::VALIDATION_TIMEOUT.to_string()
            }
            FlowError::ValidationFailed(err @ BackendError::Status { .. }) => err
                .detail()
                .unwrap_or(messages::VALIDATION_REJECTED)
                .to_string(),
            FlowError::ValidationFailed(_) => messages::VALIDATION_UNREACHABLE.to_string(),
            FlowError::SubmissionFailed(err) => format!(
                "No pudimos enviar la denuncia: {}",
                err.detail().unwrap_or(messages::CONNECTION_ERROR)
            ),
            FlowError::InvalidFields(_) => messages::MISSING_FIELDS.to_string(),
            FlowError::ConfigurationUnavailable | FlowError::InvalidSchema(_) => {
                messages::CONFIGURATION_UNAVAILABLE.to_string()
            }
            FlowError::InvalidInput(reason) => reason.clone(),
            _ => messages::CONNECTION_ERROR.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
