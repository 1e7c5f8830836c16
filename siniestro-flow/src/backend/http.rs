use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Response, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use super::{BackendResult, ClaimsBackend, FeedbackBackend, with_timeout};
use crate::{
    config::FlowConfig,
    error::BackendError,
    feedback::{RatingReceipt, RatingSubmission, RatingSummary, Testimonial},
    form::context_fields,
    schema::SchemaCatalogue,
    submission::{ClaimCreated, ClaimSubmission},
    validation::ValidationResponse,
};

const FORM_CONFIG_PATH: &str = "/api/config-formularios";
const VALIDATE_PATH: &str = "/api/validate-siniestro";
const CREATE_CLAIM_PATH: &str = "/api/create-siniestro";
const RATING_PATH: &str = "/api/rating";
const TESTIMONIALS_PATH: &str = "/api/testimonios";

/// reqwest-backed client for the brokerage backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &FlowConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &FlowConfig) -> Self {
        Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            timeout: config.http_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let url = self.url(path);
        with_timeout(self.timeout, async {
            let response = self.client.get(&url).send().await?;
            read_json(response).await
        })
        .await
    }
}

/// Reads the body and turns non-2xx answers into [`BackendError::Status`],
/// keeping the backend's `detail`/`message` when it sent one.
async fn read_body(response: Response) -> BackendResult<(StatusCode, Vec<u8>)> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.bytes().await?;

    if !status.is_success() {
        let detail = error_detail(&body);
        warn!(%url, status = status.as_u16(), ?detail, "Backend rejected request");
        return Err(BackendError::Status {
            status: status.as_u16(),
            detail,
        });
    }

    debug!(%url, status = status.as_u16(), bytes = body.len(), "Backend response");
    Ok((status, body.to_vec()))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let (_, body) = read_body(response).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn error_detail(body: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: Option<Value>,
        message: Option<Value>,
    }

    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    [parsed.detail, parsed.message]
        .into_iter()
        .flatten()
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
}

fn multipart_form(submission: &ClaimSubmission) -> BackendResult<Form> {
    let mut form = Form::new()
        .text(context_fields::CLAIM_TYPE, submission.claim_type.clone())
        .text(
            context_fields::POLICY_RECORD_ID,
            submission.policy_record_id.clone(),
        )
        .text(context_fields::PLATE, submission.plate.clone())
        .text(context_fields::NATIONAL_ID, submission.national_id.clone());

    for (field_id, attachment) in &submission.attachments {
        let mut part =
            Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
        if let Some(content_type) = &attachment.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| BackendError::Decode(e.to_string()))?;
        }
        form = form.part(field_id.clone(), part);
    }

    let datos = serde_json::to_string(&submission.data)?;
    Ok(form.text("datos", datos))
}

#[async_trait]
impl ClaimsBackend for HttpBackend {
    async fn form_config(&self) -> BackendResult<SchemaCatalogue> {
        let url = self.url(FORM_CONFIG_PATH);
        let (_, body) = with_timeout(self.timeout, async {
            let response = self.client.get(&url).send().await?;
            read_body(response).await
        })
        .await?;
        SchemaCatalogue::from_slice(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn validate_policy(
        &self,
        plate: &str,
        national_id: &str,
    ) -> BackendResult<ValidationResponse> {
        let url = self.url(VALIDATE_PATH);
        with_timeout(self.timeout, async {
            let response = self
                .client
                .get(&url)
                .query(&[("patente", plate), ("dni", national_id)])
                .send()
                .await?;
            // coverage is only confirmed by a plain 200
            let (status, body) = read_body(response).await?;
            if status != StatusCode::OK {
                warn!(%url, status = status.as_u16(), "Unexpected validation status");
                return Err(BackendError::Status {
                    status: status.as_u16(),
                    detail: None,
                });
            }
            Ok(serde_json::from_slice(&body)?)
        })
        .await
    }

    async fn create_claim(&self, submission: &ClaimSubmission) -> BackendResult<ClaimCreated> {
        let url = self.url(CREATE_CLAIM_PATH);
        let form = multipart_form(submission)?;
        with_timeout(self.timeout, async {
            let response = self.client.post(&url).multipart(form).send().await?;
            read_json(response).await
        })
        .await
    }
}

#[async_trait]
impl FeedbackBackend for HttpBackend {
    async fn rating(&self) -> BackendResult<RatingSummary> {
        self.get_json(RATING_PATH).await
    }

    async fn submit_rating(&self, rating: &RatingSubmission) -> BackendResult<RatingReceipt> {
        let url = self.url(RATING_PATH);
        with_timeout(self.timeout, async {
            let response = self.client.post(&url).json(rating).send().await?;
            read_json(response).await
        })
        .await
    }

    async fn testimonials(&self) -> BackendResult<Vec<Testimonial>> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            testimonios: Vec<Testimonial>,
        }

        let envelope: Envelope = self.get_json(TESTIMONIALS_PATH).await?;
        Ok(envelope.testimonios)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::submission::Attachment;

    fn backend(server: &MockServer, timeout: Duration) -> HttpBackend {
        HttpBackend::new(&FlowConfig {
            backend_url: server.uri(),
            http_timeout: timeout,
            ..FlowConfig::default()
        })
    }

    #[test]
    fn url_joins_without_double_slash() {
        let backend = HttpBackend::new(&FlowConfig {
            backend_url: "http://localhost:8000/".to_string(),
            ..FlowConfig::default()
        });
        assert_eq!(backend.url(RATING_PATH), "http://localhost:8000/api/rating");
    }

    #[tokio::test]
    async fn validate_sends_plate_and_id_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/validate-siniestro"))
            .and(query_param("patente", "AB123CD"))
            .and(query_param("dni", "12345678"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": true,
                "cliente": {"nombres": "Juan", "apellido": "Pérez"},
                "poliza": {"record_id": "recPOL", "numero": "POL-1", "estado": "VIGENTE", "vida": true}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend(&server, Duration::from_secs(5))
            .validate_policy("AB123CD", "12345678")
            .await
            .unwrap();

        assert!(response.valid);
        assert_eq!(response.client.unwrap().first_names, "Juan");
        let policy = response.policy.unwrap();
        assert_eq!(policy.number, "POL-1");
        assert!(policy.life_coverage);
        assert!(!policy.roadside_assistance);
    }

    #[tokio::test]
    async fn validation_needs_plain_ok_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/validate-siniestro"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"valid": true})))
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_secs(5))
            .validate_policy("AB123CD", "12345678")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 202, .. }));
    }

    #[tokio::test]
    async fn form_config_decodes_catalogue_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config-formularios"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"robo": {"titulo": "Robo", "campos": []}, "choque": {"titulo": "Choque", "campos": []}}"#,
            ))
            .mount(&server)
            .await;

        let catalogue = backend(&server, Duration::from_secs(5))
            .form_config()
            .await
            .unwrap();
        let slugs: Vec<_> = catalogue.menu().into_iter().map(|e| e.slug).collect();
        assert_eq!(slugs, vec!["robo", "choque"]);
    }

    #[tokio::test]
    async fn malformed_catalogue_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config-formularios"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1, 2]"))
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_secs(5))
            .form_config()
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn non_success_status_keeps_backend_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create-siniestro"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"detail": "Airtable caído"})),
            )
            .mount(&server)
            .await;

        let submission = ClaimSubmission {
            claim_type: "granizo".into(),
            policy_record_id: "recPOL".into(),
            national_id: "12345678".into(),
            plate: "AB123CD".into(),
            data: serde_json::Map::new(),
            attachments: vec![],
        };
        let err = backend(&server, Duration::from_secs(5))
            .create_claim(&submission)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Status { status: 500, .. }));
        assert_eq!(err.detail(), Some("Airtable caído"));
    }

    #[tokio::test]
    async fn create_claim_sends_multipart_with_datos_and_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create-siniestro"))
            .and(body_string_contains("name=\"tipo_formulario\""))
            .and(body_string_contains("name=\"datos\""))
            .and(body_string_contains(r#"{"fecha":"2026-10-01"}"#))
            .and(body_string_contains("filename=\"frente.jpg\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "SIN-77"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut data = serde_json::Map::new();
        data.insert("fecha".into(), json!("2026-10-01"));
        let submission = ClaimSubmission {
            claim_type: "choque".into(),
            policy_record_id: "recPOL".into(),
            national_id: "12345678".into(),
            plate: "AB123CD".into(),
            data,
            attachments: vec![(
                "fotos".into(),
                Attachment::new("frente.jpg", Some("image/jpeg".into()), b"jpeg".to_vec()),
            )],
        };

        let created = backend(&server, Duration::from_secs(5))
            .create_claim(&submission)
            .await
            .unwrap();
        assert_eq!(created.case_id(), "SIN-77");
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config-formularios"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_millis(50))
            .form_config()
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn testimonials_unwrap_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/testimonios"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "testimonios": [{
                    "id": "rec1", "nombre": "Ana Gómez", "iniciales": "AG",
                    "estrellas": 5, "comentario": "Excelente", "fecha": "Hoy", "fotoUrl": null
                }],
                "total": 1
            })))
            .mount(&server)
            .await;

        let testimonials = backend(&server, Duration::from_secs(5))
            .testimonials()
            .await
            .unwrap();
        assert_eq!(testimonials.len(), 1);
        assert_eq!(testimonials[0].initials, "AG");
    }
}
