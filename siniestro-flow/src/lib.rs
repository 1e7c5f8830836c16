pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod form;
pub mod machine;
pub mod quote;
pub mod schema;
pub mod schema_cache;
pub mod session;
pub mod submission;
pub mod validation;

// Re-export commonly used types
pub use backend::{ClaimsBackend, FeedbackBackend, HttpBackend};
pub use config::{FlowConfig, InputRules};
pub use controller::{FlowController, SessionView, StepOutcome};
pub use error::{BackendError, FlowError, Result};
pub use form::{FieldValue, FormSnapshot, FormView};
pub use machine::{Effect, FlowEvent, FlowStep, transition};
pub use schema::{MenuEntry, SchemaCatalogue};
pub use schema_cache::{FallbackDocument, SchemaCache, SchemaLoad, SchemaSource};
pub use session::{InMemorySessionStore, SessionRecord, SessionStore};
pub use submission::{Attachment, ClaimCreated, ClaimSubmission};
pub use validation::{ValidationResult, WelcomeCard};
