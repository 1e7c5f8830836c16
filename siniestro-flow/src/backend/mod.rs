//! Contracts of the external claims backend and their HTTP implementation.

pub mod http;

use std::{future::Future, time::Duration};

use async_trait::async_trait;

use crate::{
    error::BackendError,
    feedback::{RatingReceipt, RatingSubmission, RatingSummary, Testimonial},
    schema::SchemaCatalogue,
    submission::{ClaimCreated, ClaimSubmission},
    validation::ValidationResponse,
};

pub use http::HttpBackend;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Endpoints used by the claim intake flow.
#[async_trait]
pub trait ClaimsBackend: Send + Sync {
    /// `GET /api/config-formularios`
    async fn form_config(&self) -> BackendResult<SchemaCatalogue>;

    /// `GET /api/validate-siniestro?patente=&dni=`
    async fn validate_policy(&self, plate: &str, national_id: &str)
    -> BackendResult<ValidationResponse>;

    /// `POST /api/create-siniestro`
    async fn create_claim(&self, submission: &ClaimSubmission) -> BackendResult<ClaimCreated>;
}

/// Endpoints behind the ratings and testimonials widgets.
#[async_trait]
pub trait FeedbackBackend: Send + Sync {
    async fn rating(&self) -> BackendResult<RatingSummary>;

    async fn submit_rating(&self, rating: &RatingSubmission) -> BackendResult<RatingReceipt>;

    async fn testimonials(&self) -> BackendResult<Vec<Testimonial>>;
}

/// Bounds `fut` by `limit`; the request is dropped when the limit elapses.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| BackendError::Timeout(limit))?
}
