//! Validation step: confirms that a national ID and a plate belong to an
//! active policy before any claim form is shown.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    backend::ClaimsBackend,
    config::InputRules,
    error::{BackendError, FlowError, Result, messages},
};

/// Normalized identification entered by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub national_id: String,
    pub plate: String,
}

impl Identification {
    /// Trims both values, uppercases the plate and rejects values shorter than
    /// the configured minimums without touching the network.
    pub fn parse(national_id: &str, plate: &str, rules: &InputRules) -> Result<Self> {
        let national_id = national_id.trim().to_string();
        let plate = plate.trim().to_uppercase();

        if plate.chars().count() < rules.min_plate_len
            || national_id.chars().count() < rules.min_national_id_len
        {
            return Err(FlowError::IncompleteData);
        }

        Ok(Self { national_id, plate })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "nombres", default)]
    pub first_names: String,
    #[serde(rename = "apellido", default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInfo {
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(rename = "numero", default)]
    pub number: String,
    #[serde(rename = "patente", default)]
    pub plate: Option<String>,
    #[serde(rename = "tipo_vehiculo", default)]
    pub vehicle_type: Option<String>,
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
    #[serde(rename = "estado", default)]
    pub status: String,
    #[serde(rename = "vida", default)]
    pub life_coverage: bool,
    #[serde(rename = "auxilio", default)]
    pub roadside_assistance: bool,
    #[serde(rename = "descripcion_completa", default)]
    pub description: Option<String>,
}

/// Body of `GET /api/validate-siniestro`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(rename = "cliente", default)]
    pub client: Option<ClientInfo>,
    #[serde(rename = "poliza", default)]
    pub policy: Option<PolicyInfo>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Confirmed identity and policy, kept in the session for the rest of the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub first_names: String,
    pub last_name: String,
    pub national_id: String,
    pub plate: String,
    pub policy_record_id: Option<String>,
    pub policy_number: String,
    pub policy: PolicyInfo,
}

impl ValidationResult {
    fn from_response(id: Identification, response: ValidationResponse) -> Result<Self> {
        if !response.valid {
            let reason = response
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| messages::COVERAGE_NOT_CONFIRMED.to_string());
            return Err(FlowError::CoverageRejected(reason));
        }

        let (Some(client), Some(policy)) = (response.client, response.policy) else {
            return Err(FlowError::ValidationFailed(BackendError::Decode(
                "valid response without client or policy".to_string(),
            )));
        };

        Ok(Self {
            first_names: client.first_names,
            last_name: client.last_name,
            national_id: id.national_id,
            plate: id.plate,
            policy_record_id: policy.record_id.clone(),
            policy_number: policy.number.clone(),
            policy,
        })
    }
}

/// Runs the validation step against the backend.
pub async fn validate(
    backend: &dyn ClaimsBackend,
    rules: &InputRules,
    national_id: &str,
    plate: &str,
) -> Result<ValidationResult> {
    let id = Identification::parse(national_id, plate, rules)?;
    info!(plate = %id.plate, "Validating policy coverage");

    let response = backend
        .validate_policy(&id.plate, &id.national_id)
        .await
        .map_err(|e| {
            warn!(plate = %id.plate, error = %e, "Coverage validation request failed");
            FlowError::ValidationFailed(e)
        })?;

    ValidationResult::from_response(id, response)
}

static STATUS_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("🆘|AUX|INFINITY|❤️|VIDA|✅|⏰").expect("status marker pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBadge {
    Life,
    Roadside,
}

/// Summary shown once coverage is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeCard {
    pub greeting_name: String,
    pub vehicle_type: String,
    pub plate: String,
    pub policy_number: String,
    pub status: String,
    pub active: bool,
    pub badges: Vec<CoverageBadge>,
}

impl From<&ValidationResult> for WelcomeCard {
    fn from(result: &ValidationResult) -> Self {
        let policy = &result.policy;

        let mut status = STATUS_MARKERS
            .replace_all(&policy.status, "")
            .trim()
            .to_string();
        if status.is_empty() {
            status = "CONSULTAR".to_string();
        }
        let active = status.contains("VIGENTE") || status.contains("VENCE");

        let mut badges = Vec::new();
        if policy.life_coverage || policy.status.contains("VIDA") {
            badges.push(CoverageBadge::Life);
        }
        if policy.roadside_assistance || policy.status.contains("AUX") {
            badges.push(CoverageBadge::Roadside);
        }

        Self {
            greeting_name: result.first_names.clone(),
            vehicle_type: policy.vehicle_type.clone().unwrap_or_default(),
            plate: policy.plate.clone().unwrap_or_else(|| result.plate.clone()),
            policy_number: result.policy_number.clone(),
            status,
            active,
            badges,
        }
    }
}
