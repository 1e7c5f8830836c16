//! Ratings and testimonials shown next to the claim flow.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    backend::FeedbackBackend,
    error::{FlowError, Result},
};

pub const MAX_STARS: u8 = 5;
pub const NO_TESTIMONIALS: &str = "Aún no hay opiniones publicadas";
pub const TESTIMONIALS_UNAVAILABLE: &str = "Error al cargar opiniones";
pub const CLIENT_YES: &str = "Sí";
pub const CLIENT_NO: &str = "No";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total: u64,
}

/// Full/half/empty star counts for a 0–5 rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarDisplay {
    pub full: u8,
    pub half: bool,
    pub empty: u8,
}

impl StarDisplay {
    pub fn from_rating(rating: f64) -> Self {
        let rating = rating.clamp(0.0, f64::from(MAX_STARS));
        let full = rating.floor() as u8;
        // ratings arrive rounded to one decimal
        let fraction = ((rating - rating.floor()) * 10.0).round() / 10.0;
        let half = (0.3..0.8).contains(&fraction);
        Self {
            full,
            half,
            empty: MAX_STARS - full - u8::from(half),
        }
    }
}

/// What the rating widget shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingDisplay {
    pub stars: StarDisplay,
    pub rating: f64,
    pub total: Option<u64>,
}

impl RatingDisplay {
    /// Static 4/5 shown when the aggregate cannot be loaded.
    pub fn fallback() -> Self {
        Self {
            stars: StarDisplay::from_rating(4.0),
            rating: 4.0,
            total: None,
        }
    }
}

impl From<RatingSummary> for RatingDisplay {
    fn from(summary: RatingSummary) -> Self {
        Self {
            stars: StarDisplay::from_rating(summary.rating),
            rating: summary.rating,
            total: Some(summary.total),
        }
    }
}

pub async fn load_rating(backend: &dyn FeedbackBackend) -> RatingDisplay {
    match backend.rating().await {
        Ok(summary) => {
            info!(rating = summary.rating, total = summary.total, "Rating loaded");
            summary.into()
        }
        Err(e) => {
            warn!(error = %e, "Failed to load rating, showing fallback");
            RatingDisplay::fallback()
        }
    }
}

/// Rating as entered in the rating form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RatingForm {
    #[serde(default)]
    pub stars: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_client: bool,
    #[serde(default)]
    pub national_id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub allow_publish: bool,
    #[serde(default)]
    pub use_photo: bool,
}

/// Body of `POST /api/rating`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSubmission {
    pub estrellas: u8,
    pub nombre: String,
    pub es_cliente: String,
    pub dni: Option<u64>,
    pub servicio: String,
    pub comentario: String,
    pub modo: String,
    pub autoriza_publicar: bool,
    pub usar_foto: bool,
}

impl RatingSubmission {
    pub fn from_form(form: RatingForm) -> Result<Self> {
        if form.stars == 0 || form.stars > MAX_STARS {
            return Err(FlowError::InvalidInput(
                "Por favor selecciona una calificación".to_string(),
            ));
        }
        if form.service.trim().is_empty() {
            return Err(FlowError::InvalidInput(
                "Por favor selecciona qué servicio estás calificando".to_string(),
            ));
        }

        let dni = if form.is_client {
            let digits: String = form
                .national_id
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        } else {
            None
        };

        Ok(Self {
            estrellas: form.stars,
            nombre: form.name.trim().to_string(),
            es_cliente: if form.is_client { CLIENT_YES } else { CLIENT_NO }.to_string(),
            dni,
            servicio: form.service.trim().to_string(),
            comentario: form.comment.trim().to_string(),
            modo: "Online".to_string(),
            autoriza_publicar: form.allow_publish,
            usar_foto: form.is_client && form.use_photo,
        })
    }

    pub fn thanks(&self) -> String {
        let who = if self.nombre.is_empty() {
            "por tu tiempo"
        } else {
            self.nombre.as_str()
        };
        format!(
            "¡Gracias {who}! Tu calificación de {} estrellas ha sido registrada.",
            self.estrellas
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingReceipt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "recordId", default)]
    pub record_id: Option<String>,
    #[serde(rename = "clienteVinculado", default)]
    pub client_linked: bool,
}

pub async fn submit_rating(
    backend: &dyn FeedbackBackend,
    form: RatingForm,
) -> Result<(RatingSubmission, RatingReceipt)> {
    let submission = RatingSubmission::from_form(form)?;
    let receipt = backend.submit_rating(&submission).await.map_err(|e| {
        warn!(error = %e, "Rating submission failed");
        FlowError::Backend(e)
    })?;
    info!(stars = submission.estrellas, record_id = ?receipt.record_id, "Rating saved");
    Ok((submission, receipt))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "iniciales", default)]
    pub initials: String,
    #[serde(rename = "estrellas", default)]
    pub stars: u8,
    #[serde(rename = "comentario", default)]
    pub comment: String,
    #[serde(rename = "fecha", default)]
    pub date: String,
    #[serde(rename = "fotoUrl", default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Avatar {
    Photo(String),
    Initials(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestimonialCard {
    pub name: String,
    pub avatar: Avatar,
    /// One entry per star slot, `true` when filled.
    pub stars: Vec<bool>,
    pub comment: String,
    pub date: String,
}

impl From<Testimonial> for TestimonialCard {
    fn from(t: Testimonial) -> Self {
        let avatar = match t.photo_url.filter(|url| !url.is_empty()) {
            Some(url) => Avatar::Photo(url),
            None => Avatar::Initials(t.initials),
        };
        Self {
            name: t.name,
            avatar,
            stars: (0..MAX_STARS).map(|i| i < t.stars).collect(),
            comment: t.comment,
            date: t.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestimonialsView {
    pub cards: Vec<TestimonialCard>,
    pub notice: Option<String>,
}

pub async fn load_testimonials(backend: &dyn FeedbackBackend) -> TestimonialsView {
    match backend.testimonials().await {
        Ok(list) if list.is_empty() => TestimonialsView {
            cards: Vec::new(),
            notice: Some(NO_TESTIMONIALS.to_string()),
        },
        Ok(list) => {
            info!(count = list.len(), "Testimonials loaded");
            TestimonialsView {
                cards: list.into_iter().map(TestimonialCard::from).collect(),
                notice: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to load testimonials");
            TestimonialsView {
                cards: Vec::new(),
                notice: Some(TESTIMONIALS_UNAVAILABLE.to_string()),
            }
        }
    }
}
