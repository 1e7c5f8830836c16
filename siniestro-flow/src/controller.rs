//! FlowController: owns the schema cache, the session store and the backend,
//! and runs every user action as _load → call backend → transition → save_.
//!
//! Failures a person can act on (short inputs, rejected coverage, missing
//! fields, backend errors) come back as `Ok` outcomes carrying
//! [`Effect::ShowError`]. Only misuse of the flow itself (unknown session,
//! unknown claim type, out-of-order action, duplicate in-flight request,
//! unavailable configuration) is returned as `Err`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    backend::ClaimsBackend,
    config::{FlowConfig, InputRules},
    error::{FlowError, Result},
    form::{FormSnapshot, FormView, build_submission, check_completeness, render_form},
    machine::{Effect, FlowEvent, FlowStep, transition},
    schema::MenuEntry,
    schema_cache::{FallbackDocument, SchemaCache},
    session::{InMemorySessionStore, SessionRecord, SessionStore},
    submission::{InFlight, Operation},
    validation::{self, WelcomeCard},
};

/// What the page needs after one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub session_id: String,
    pub step: FlowStep,
    pub effects: Vec<Effect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<FormView>,
}

impl StepOutcome {
    fn new(record: &SessionRecord, effects: Vec<Effect>) -> Self {
        Self {
            session_id: record.id.clone(),
            step: record.step.clone(),
            effects,
            form: None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.effects.iter().find_map(|e| match e {
            Effect::ShowError(message) => Some(message.as_str()),
            _ => None,
        })
    }
}

/// Read-only view of a session for the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub step: FlowStep,
    pub welcome: Option<WelcomeCard>,
    pub selected_type: Option<String>,
    pub status_message: Option<String>,
}

impl From<&SessionRecord> for SessionView {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.id.clone(),
            step: record.step.clone(),
            welcome: record.validation.as_ref().map(WelcomeCard::from),
            selected_type: record.selected_type.clone(),
            status_message: record.status_message.clone(),
        }
    }
}

pub struct FlowController {
    backend: Arc<dyn ClaimsBackend>,
    schemas: Arc<SchemaCache>,
    sessions: Arc<dyn SessionStore>,
    rules: InputRules,
    in_flight: InFlight,
}

impl FlowController {
    pub fn new(
        backend: Arc<dyn ClaimsBackend>,
        schemas: Arc<SchemaCache>,
        sessions: Arc<dyn SessionStore>,
        rules: InputRules,
    ) -> Self {
        Self {
            backend,
            schemas,
            sessions,
            rules,
            in_flight: InFlight::new(),
        }
    }

    /// Wires a controller with the in-memory session store and the fallback
    /// document named in `config`.
    pub fn from_config(config: &FlowConfig, backend: Arc<dyn ClaimsBackend>) -> Self {
        let schemas = Arc::new(SchemaCache::new(
            backend.clone(),
            FallbackDocument::new(config.fallback_config.clone(), config.http_timeout),
            config.schema_retry_delay,
        ));
        Self::new(
            backend,
            schemas,
            Arc::new(InMemorySessionStore::with_ttl(config.session_ttl)),
            config.input_rules,
        )
    }

    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    pub async fn menu(&self) -> Result<Vec<MenuEntry>> {
        self.schemas.menu().await
    }

    pub async fn start(&self) -> Result<StepOutcome> {
        let record = SessionRecord::generate();
        self.sessions.save(record.clone()).await?;
        info!(session_id = %record.id, "Claim flow session started");
        Ok(StepOutcome::new(&record, vec![Effect::ClearError]))
    }

    pub async fn session(&self, session_id: &str) -> Result<SessionView> {
        Ok(SessionView::from(&self.load(session_id).await?))
    }

    pub async fn validate(
        &self,
        session_id: &str,
        national_id: &str,
        plate: &str,
    ) -> Result<StepOutcome> {
        let before = self.load(session_id).await?;
        let (record, mut effects) = transition(&before, FlowEvent::ValidationStarted)?;
        let _permit = self.in_flight.acquire(session_id, Operation::Validation)?;

        let event = match validation::validate(&*self.backend, &self.rules, national_id, plate)
            .await
        {
            Ok(result) => {
                info!(
                    session_id,
                    plate = %result.plate,
                    policy = %result.policy_number,
                    "Coverage confirmed"
                );
                FlowEvent::Validated(result)
            }
            Err(e) => {
                warn!(session_id, error = %e, "Validation step failed");
                FlowEvent::ValidationFailed(e.user_message())
            }
        };

        let (record, more) = transition(&record, event)?;
        effects.extend(more);
        self.commit(&before, record, effects).await
    }

    pub async fn select_type(&self, session_id: &str, slug: &str) -> Result<StepOutcome> {
        let before = self.load(session_id).await?;
        let catalogue = self.schemas.ready().await?;
        catalogue.require(slug)?;

        let (record, effects) = transition(&before, FlowEvent::TypeSelected(slug.to_string()))?;
        let validation = record.validation.as_ref().ok_or(FlowError::NotValidated)?;
        let form = render_form(&catalogue, slug, validation)?;

        let outcome = self.commit(&before, record, effects).await?;
        if outcome.step != (FlowStep::Form { slug: slug.to_string() }) {
            return Ok(outcome);
        }
        info!(session_id, claim_type = slug, "Claim type selected");
        Ok(StepOutcome {
            form: Some(form),
            ..outcome
        })
    }

    /// Re-renders the form of the current claim type.
    pub async fn form_view(&self, session_id: &str) -> Result<FormView> {
        let record = self.load(session_id).await?;
        let FlowStep::Form { slug } = &record.step else {
            return Err(FlowError::InvalidTransition {
                step: record.step.name().to_string(),
                event: "form_view".to_string(),
            });
        };
        let validation = record.validation.as_ref().ok_or(FlowError::NotValidated)?;
        let catalogue = self.schemas.ready().await?;
        render_form(&catalogue, slug, validation)
    }

    pub async fn submit(&self, session_id: &str, snapshot: FormSnapshot) -> Result<StepOutcome> {
        let before = self.load(session_id).await?;
        let FlowStep::Form { slug } = &before.step else {
            return Err(FlowError::InvalidTransition {
                step: before.step.name().to_string(),
                event: "submit".to_string(),
            });
        };
        let validation = before.validation.as_ref().ok_or(FlowError::NotValidated)?;
        let _permit = self.in_flight.acquire(session_id, Operation::Submission)?;

        let catalogue = self.schemas.ready().await?;
        let schema = catalogue.require(slug)?;

        let issues = check_completeness(schema, &snapshot);
        let event = if !issues.is_empty() {
            info!(session_id, claim_type = %slug, missing = issues.len(), "Submission blocked locally");
            FlowEvent::SubmissionRejected(issues)
        } else {
            let submission = build_submission(slug, validation, &snapshot);
            info!(
                session_id,
                claim_type = %slug,
                attachments = submission.attachments.len(),
                "Submitting claim"
            );
            match self.backend.create_claim(&submission).await {
                Ok(created) => {
                    info!(session_id, case_id = created.case_id(), "Claim created");
                    FlowEvent::ClaimCreated(created)
                }
                Err(e) => {
                    warn!(session_id, error = %e, "Claim submission failed");
                    FlowEvent::SubmissionFailed(FlowError::SubmissionFailed(e).user_message())
                }
            }
        };

        let (record, effects) = transition(&before, event)?;
        self.commit(&before, record, effects).await
    }

    /// One step back: form → type selection → validation.
    pub async fn back(&self, session_id: &str) -> Result<StepOutcome> {
        let record = self.load(session_id).await?;
        let event = match record.step {
            FlowStep::Form { .. } => FlowEvent::BackToSelection,
            _ => FlowEvent::BackToValidation,
        };
        self.apply(&record, event).await
    }

    pub async fn reset(&self, session_id: &str) -> Result<StepOutcome> {
        let record = self.load(session_id).await?;
        self.apply(&record, FlowEvent::Reset).await
    }

    /// Ends the session; the confirmed validation goes with it.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        self.load(session_id).await?;
        self.sessions.delete(session_id).await?;
        info!(session_id, "Claim flow session closed");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionRecord> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    async fn apply(&self, before: &SessionRecord, event: FlowEvent) -> Result<StepOutcome> {
        let (record, effects) = transition(before, event)?;
        self.commit(before, record, effects).await
    }

    /// Writes `record` only if the session is still at the revision `before`
    /// was read at. A session closed meanwhile is `SessionNotFound`; one that
    /// was reset or moved on keeps its state and the result is dropped.
    async fn commit(
        &self,
        before: &SessionRecord,
        record: SessionRecord,
        effects: Vec<Effect>,
    ) -> Result<StepOutcome> {
        if let Some(stored) = self.sessions.replace(record, before.revision).await? {
            return Ok(StepOutcome::new(&stored, effects));
        }

        let current = self.load(&before.id).await?;
        info!(
            session_id = %before.id,
            step = current.step.name(),
            "Session changed while the request was in flight; result dropped"
        );
        Ok(StepOutcome::new(&current, Vec::new()))
    }
}
