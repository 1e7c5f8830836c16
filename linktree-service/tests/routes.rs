use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use linktree_service::{AppState, build_router};
use serde_json::{Value, json};
use siniestro_flow::{
    BackendError, ClaimCreated, ClaimSubmission, ClaimsBackend, FallbackDocument, FeedbackBackend,
    FlowController, InMemorySessionStore, InputRules, SchemaCache, SchemaCatalogue,
    backend::BackendResult,
    feedback::{RatingReceipt, RatingSubmission, RatingSummary, Testimonial},
    validation::ValidationResponse,
};
use tower::ServiceExt;

const BOUNDARY: &str = "linktree-test-boundary";

#[derive(Default)]
struct FakeBackend {
    catalogue: Option<SchemaCatalogue>,
    rating: Option<RatingSummary>,
    submissions: Mutex<Vec<ClaimSubmission>>,
}

#[async_trait]
impl ClaimsBackend for FakeBackend {
    async fn form_config(&self) -> BackendResult<SchemaCatalogue> {
        self.catalogue
            .clone()
            .ok_or_else(|| BackendError::Status {
                status: 502,
                detail: None,
            })
    }

    async fn validate_policy(
        &self,
        _plate: &str,
        _national_id: &str,
    ) -> BackendResult<ValidationResponse> {
        Ok(serde_json::from_value(json!({
            "valid": true,
            "cliente": {"nombres": "Juan", "apellido": "Pérez"},
            "poliza": {"record_id": "recPOL1", "numero": "POL-1", "estado": "✅ VIGENTE"}
        }))?)
    }

    async fn create_claim(&self, submission: &ClaimSubmission) -> BackendResult<ClaimCreated> {
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(ClaimCreated {
            id: Some("SIN-7".into()),
        })
    }
}

#[async_trait]
impl FeedbackBackend for FakeBackend {
    async fn rating(&self) -> BackendResult<RatingSummary> {
        self.rating
            .ok_or_else(|| BackendError::Network("connection refused".into()))
    }

    async fn submit_rating(&self, _rating: &RatingSubmission) -> BackendResult<RatingReceipt> {
        Ok(RatingReceipt {
            status: Some("success".into()),
            record_id: Some("recRATE".into()),
            ..RatingReceipt::default()
        })
    }

    async fn testimonials(&self) -> BackendResult<Vec<Testimonial>> {
        Ok(Vec::new())
    }
}

fn catalogue() -> SchemaCatalogue {
    let raw = json!({
        "granizo": {
            "titulo": "Granizo",
            "icono": "🌨️",
            "campos": [
                {"id": "fecha", "label": "Fecha", "type": "date", "required": true},
                {"id": "cochera", "label": "Estaba en cochera", "type": "checkbox"},
                {"id": "fotos", "label": "Fotos", "type": "file", "required": true}
            ]
        }
    });
    SchemaCatalogue::from_slice(&serde_json::to_vec(&raw).unwrap()).unwrap()
}

async fn app(backend: FakeBackend) -> (Router, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let schemas = Arc::new(SchemaCache::new(
        backend.clone(),
        FallbackDocument::new(
            PathBuf::from("/nonexistent/FORM_CONFIG.json"),
            Duration::from_secs(1),
        ),
        Duration::from_millis(5),
    ));
    schemas.load().await;

    let controller = Arc::new(FlowController::new(
        backend.clone(),
        schemas,
        Arc::new(InMemorySessionStore::new()),
        InputRules::default(),
    ));
    let state = AppState::new(controller, backend.clone(), "5493415551234");
    (build_router(state), backend)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn multipart_body() -> String {
    [
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fecha\"\r\n\r\n2026-10-18\r\n"
        ),
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"cochera\"\r\n\r\non\r\n"
        ),
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"dni\"\r\n\r\n99999999\r\n"
        ),
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fotos\"; filename=\"techo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\njpeg-bytes\r\n"
        ),
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fotos\"; filename=\"\"\r\nContent-Type: application/octet-stream\r\n\r\n\r\n"
        ),
        format!("--{BOUNDARY}--\r\n"),
    ]
    .concat()
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = app(FakeBackend::default()).await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn full_claim_flow_over_http() {
    let (app, backend) = app(FakeBackend {
        catalogue: Some(catalogue()),
        ..FakeBackend::default()
    })
    .await;

    let (status, started) = send(&app, Method::POST, "/siniestro/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let id = started["session_id"].as_str().unwrap().to_string();

    let (status, validated) = send(
        &app,
        Method::POST,
        &format!("/siniestro/sessions/{id}/validate"),
        Some(json!({"dni": "12345678", "patente": "ab123cd"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validated["step"]["step"], "type_selection");

    let (_, view) = send(&app, Method::GET, &format!("/siniestro/sessions/{id}"), None).await;
    assert_eq!(view["welcome"]["status"], "VIGENTE");
    assert_eq!(view["welcome"]["plate"], "AB123CD");

    let (status, selected) = send(
        &app,
        Method::POST,
        &format!("/siniestro/sessions/{id}/select"),
        Some(json!({"tipo": "granizo"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(selected["form"]["controls"].as_array().unwrap().len(), 3);
    assert_eq!(selected["form"]["hidden"][3]["value"], "12345678");

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/siniestro/sessions/{id}/submit"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body()))
        .unwrap();
    let (status, submitted) = read(app.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["step"]["step"], "validation");
    assert_eq!(submitted["effects"][0]["effect"], "show_confirmation");
    assert_eq!(submitted["effects"][0]["data"]["case_id"], "SIN-7");

    let sent = backend.submissions.lock().unwrap()[0].clone();
    assert_eq!(sent.national_id, "12345678");
    assert_eq!(sent.data.get("cochera"), Some(&json!(true)));
    assert!(!sent.data.contains_key("dni"));
    assert_eq!(sent.attachments.len(), 1);
    assert_eq!(sent.attachments[0].1.file_name, "techo.jpg");
}

#[tokio::test]
async fn menu_is_unavailable_without_configuration() {
    let (app, _) = app(FakeBackend::default()).await;
    let (status, body) = send(&app, Method::GET, "/siniestro/menu", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["error"],
        "Error cargando la configuración del sistema. Por favor recarga la página."
    );
}

#[tokio::test]
async fn menu_lists_claim_types_with_source() {
    let (app, _) = app(FakeBackend {
        catalogue: Some(catalogue()),
        ..FakeBackend::default()
    })
    .await;
    let (status, body) = send(&app, Method::GET, "/siniestro/menu", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "primary");
    assert_eq!(body["claim_types"][0]["slug"], "granizo");
    assert_eq!(body["claim_types"][0]["icon"]["kind"], "glyph");
}

#[tokio::test]
async fn unknown_session_is_not_found_and_early_select_conflicts() {
    let (app, _) = app(FakeBackend {
        catalogue: Some(catalogue()),
        ..FakeBackend::default()
    })
    .await;

    let (status, _) = send(&app, Method::GET, "/siniestro/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, started) = send(&app, Method::POST, "/siniestro/sessions", None).await;
    let id = started["session_id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/siniestro/sessions/{id}/select"),
        Some(json!({"tipo": "granizo"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::DELETE, &format!("/siniestro/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/siniestro/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn short_identification_is_reported_as_effect() {
    let (app, _) = app(FakeBackend::default()).await;
    let (_, started) = send(&app, Method::POST, "/siniestro/sessions", None).await;
    let id = started["session_id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/siniestro/sessions/{id}/validate"),
        Some(json!({"dni": "12", "patente": "AB1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step"]["step"], "validation");
    assert_eq!(body["effects"][1]["effect"], "show_error");
    assert_eq!(
        body["effects"][1]["data"],
        "Por favor revisá los datos ingresados (DNI o Patente incompletos)."
    );
}

#[tokio::test]
async fn rating_and_testimonials_degrade_gracefully() {
    let (app, _) = app(FakeBackend::default()).await;

    let (status, rating) = send(&app, Method::GET, "/rating", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rating["rating"], 4.0);
    assert_eq!(rating["stars"]["full"], 4);
    assert!(rating["total"].is_null());

    let (_, testimonials) = send(&app, Method::GET, "/testimonios", None).await;
    assert_eq!(testimonials["notice"], "Aún no hay opiniones publicadas");

    let (status, body) = send(
        &app,
        Method::POST,
        "/rating",
        Some(json!({"stars": 5, "name": "Ana", "service": "Siniestros"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["receipt"]["recordId"], "recRATE");

    let (status, body) = send(&app, Method::POST, "/rating", Some(json!({"service": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Por favor selecciona una calificación");
}

#[tokio::test]
async fn quote_builds_whatsapp_link() {
    let (app, _) = app(FakeBackend::default()).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/cotizacion",
        Some(json!({
            "marca": "Fiat", "modelo": "Cronos", "anio": "2021", "gnc": false, "telefono": "3415550000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["url"]
            .as_str()
            .unwrap()
            .starts_with("https://wa.me/5493415551234?text=")
    );

    let (status, _) = send(
        &app,
        Method::POST,
        "/cotizacion",
        Some(json!({"marca": "", "modelo": "Cronos", "anio": "2021", "telefono": "341"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
