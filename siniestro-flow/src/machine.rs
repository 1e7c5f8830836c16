//! Pure step transitions of the intake flow.
//!
//! [`transition`] never performs I/O: the controller runs the network calls,
//! feeds their outcome in as a [`FlowEvent`] and applies the returned
//! [`Effect`]s at the boundary.

use serde::{Deserialize, Serialize};

use crate::{
    error::{FlowError, Result, messages},
    form::FieldIssue,
    session::SessionRecord,
    submission::ClaimCreated,
    validation::{ValidationResult, WelcomeCard},
};

/// Where a session currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FlowStep {
    Validation,
    TypeSelection,
    Form { slug: String },
}

impl FlowStep {
    pub fn name(&self) -> &'static str {
        match self {
            FlowStep::Validation => "validation",
            FlowStep::TypeSelection => "type_selection",
            FlowStep::Form { .. } => "form",
        }
    }
}

/// Inputs to the flow, either user actions or outcomes of backend calls.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    ValidationStarted,
    Validated(ValidationResult),
    ValidationFailed(String),
    TypeSelected(String),
    SubmissionRejected(Vec<FieldIssue>),
    SubmissionFailed(String),
    ClaimCreated(ClaimCreated),
    BackToValidation,
    BackToSelection,
    Reset,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::ValidationStarted => "validation_started",
            FlowEvent::Validated(_) => "validated",
            FlowEvent::ValidationFailed(_) => "validation_failed",
            FlowEvent::TypeSelected(_) => "type_selected",
            FlowEvent::SubmissionRejected(_) => "submission_rejected",
            FlowEvent::SubmissionFailed(_) => "submission_failed",
            FlowEvent::ClaimCreated(_) => "claim_created",
            FlowEvent::BackToValidation => "back_to_validation",
            FlowEvent::BackToSelection => "back_to_selection",
            FlowEvent::Reset => "reset",
        }
    }
}

/// Presentation changes the page has to apply after a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "data", rename_all = "snake_case")]
pub enum Effect {
    ClearError,
    ShowError(String),
    ShowWelcome(WelcomeCard),
    ShowForm(String),
    FlagFields(Vec<FieldIssue>),
    ShowConfirmation { case_id: String, message: String },
    ClearForm,
    ClearInputs,
}

pub fn transition(record: &SessionRecord, event: FlowEvent) -> Result<(SessionRecord, Vec<Effect>)> {
    let mut next = record.clone();

    let effects = match (&record.step, event) {
        (_, FlowEvent::Reset) => {
            next = SessionRecord::new(record.id.clone());
            vec![Effect::ClearError, Effect::ClearForm, Effect::ClearInputs]
        }

        (FlowStep::Validation, FlowEvent::ValidationStarted) => {
            next.status_message = None;
            vec![Effect::ClearError]
        }
        (FlowStep::Validation, FlowEvent::Validated(result)) => {
            let card = WelcomeCard::from(&result);
            next.step = FlowStep::TypeSelection;
            next.validation = Some(result);
            next.selected_type = None;
            next.status_message = None;
            vec![Effect::ClearError, Effect::ShowWelcome(card)]
        }
        (FlowStep::Validation, FlowEvent::ValidationFailed(message)) => {
            next.status_message = Some(message.clone());
            vec![Effect::ShowError(message)]
        }

        (FlowStep::TypeSelection, FlowEvent::TypeSelected(slug)) => {
            if record.validation.is_none() {
                return Err(FlowError::NotValidated);
            }
            next.step = FlowStep::Form { slug: slug.clone() };
            next.selected_type = Some(slug.clone());
            next.status_message = None;
            vec![Effect::ClearError, Effect::ShowForm(slug)]
        }
        (FlowStep::TypeSelection, FlowEvent::BackToValidation) => {
            // the confirmed validation stays until it is replaced or reset
            next.step = FlowStep::Validation;
            next.status_message = None;
            vec![Effect::ClearError]
        }

        (FlowStep::Form { .. }, FlowEvent::SubmissionRejected(issues)) => {
            next.status_message = Some(messages::MISSING_FIELDS.to_string());
            vec![
                Effect::FlagFields(issues),
                Effect::ShowError(messages::MISSING_FIELDS.to_string()),
            ]
        }
        (FlowStep::Form { .. }, FlowEvent::SubmissionFailed(message)) => {
            next.status_message = Some(message.clone());
            vec![Effect::ShowError(message)]
        }
        (FlowStep::Form { .. }, FlowEvent::ClaimCreated(created)) => {
            next = SessionRecord::new(record.id.clone());
            vec![
                Effect::ShowConfirmation {
                    case_id: created.case_id().to_string(),
                    message: created.confirmation(),
                },
                Effect::ClearForm,
                Effect::ClearInputs,
            ]
        }
        (FlowStep::Form { .. }, FlowEvent::BackToSelection) => {
            let validation = record.validation.as_ref().ok_or(FlowError::NotValidated)?;
            next.step = FlowStep::TypeSelection;
            next.selected_type = None;
            next.status_message = None;
            vec![
                Effect::ClearForm,
                Effect::ShowWelcome(WelcomeCard::from(validation)),
            ]
        }

        (step, event) => {
            return Err(FlowError::InvalidTransition {
                step: step.name().to_string(),
                event: event.name().to_string(),
            });
        }
    };

    Ok((next, effects))
}
