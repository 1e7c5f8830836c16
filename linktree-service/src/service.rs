use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use siniestro_flow::{
    Attachment, FeedbackBackend, FlowConfig, FlowController, FlowError, FormSnapshot, FormView,
    HttpBackend, SessionView, StepOutcome,
    feedback::{self, RatingDisplay, RatingForm, TestimonialsView},
    quote::QuoteRequest,
    schema::FieldKind,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::models::{
    MenuResponse, QuoteResponse, RatingResponse, SelectRequest, ValidateRequest,
};

/// Photos from phones are large; the default axum limit is 2 MB.
pub const MAX_SUBMISSION_BYTES: usize = 25 * 1024 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn flow_error(err: FlowError) -> ApiError {
    match &err {
        FlowError::SessionNotFound(id) => not_found_error("Session not found", id),
        FlowError::ClaimTypeNotFound(slug) => not_found_error("Claim type not found", slug),
        FlowError::InvalidTransition { .. } | FlowError::NotValidated | FlowError::Busy(_) => {
            warn!(error = %err, "Rejected out-of-order request");
            (
                StatusCode::CONFLICT,
                Json(json!({ "error": err.to_string() })),
            )
        }
        FlowError::ConfigurationUnavailable | FlowError::InvalidSchema(_) => {
            error!(error = %err, "Claim flow configuration unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.user_message() })),
            )
        }
        FlowError::IncompleteData | FlowError::InvalidInput(_) | FlowError::InvalidFields(_) => {
            bad_request_error(&err.user_message())
        }
        FlowError::Backend(_) => {
            error!(error = %err, "Backend call failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.user_message(), "details": err.to_string() })),
            )
        }
        _ => {
            error!(error = %err, "Request failed");
            internal_error(&err.user_message(), &err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<FlowController>,
    pub feedback: Arc<dyn FeedbackBackend>,
    pub whatsapp_number: String,
}

impl AppState {
    pub fn new(
        controller: Arc<FlowController>,
        feedback: Arc<dyn FeedbackBackend>,
        whatsapp_number: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            feedback,
            whatsapp_number: whatsapp_number.into(),
        }
    }

    /// One HTTP client shared by the claim flow and the feedback widgets.
    pub fn from_config(config: &FlowConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(config));
        let controller = Arc::new(FlowController::from_config(config, backend.clone()));
        Self::new(controller, backend, config.whatsapp_number.clone())
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/siniestro/menu", get(claim_menu))
        .route("/siniestro/sessions", post(start_session))
        .route(
            "/siniestro/sessions/{id}",
            get(get_session).delete(close_session),
        )
        .route("/siniestro/sessions/{id}/validate", post(validate_coverage))
        .route("/siniestro/sessions/{id}/select", post(select_claim_type))
        .route("/siniestro/sessions/{id}/form", get(get_form))
        .route(
            "/siniestro/sessions/{id}/submit",
            post(submit_claim).layer(DefaultBodyLimit::max(MAX_SUBMISSION_BYTES)),
        )
        .route("/siniestro/sessions/{id}/back", post(go_back))
        .route("/siniestro/sessions/{id}/reset", post(reset_flow))
        .route("/rating", get(get_rating).post(post_rating))
        .route("/testimonios", get(get_testimonials))
        .route("/cotizacion", post(build_quote))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Linktree claim intake service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /siniestro/menu": "Selectable claim types",
            "POST /siniestro/sessions": "Start a claim flow session",
            "POST /siniestro/sessions/{id}/validate": "Validate coverage by DNI and plate",
            "POST /siniestro/sessions/{id}/select": "Choose a claim type",
            "GET /siniestro/sessions/{id}/form": "Form of the chosen claim type",
            "POST /siniestro/sessions/{id}/submit": "Submit the claim (multipart)",
            "GET /rating": "Aggregate rating",
            "GET /testimonios": "Published testimonials",
            "POST /cotizacion": "WhatsApp quote link",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn claim_menu(State(state): State<AppState>) -> ApiResult<MenuResponse> {
    let claim_types = state.controller.menu().await.map_err(flow_error)?;
    let source = state.controller.schemas().snapshot().source;
    Ok(Json(MenuResponse {
        source,
        claim_types,
    }))
}

async fn start_session(State(state): State<AppState>) -> ApiResult<StepOutcome> {
    let outcome = state.controller.start().await.map_err(flow_error)?;
    info!(session_id = %outcome.session_id, "Session created");
    Ok(Json(outcome))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    state
        .controller
        .session(&session_id)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .controller
        .close(&session_id)
        .await
        .map_err(flow_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn validate_coverage(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> ApiResult<StepOutcome> {
    let outcome = state
        .controller
        .validate(&session_id, &request.dni, &request.patente)
        .await
        .map_err(flow_error)?;
    info!(
        session_id = %session_id,
        step = outcome.step.name(),
        "Validation step handled"
    );
    Ok(Json(outcome))
}

async fn select_claim_type(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<StepOutcome> {
    state
        .controller
        .select_type(&session_id, &request.tipo)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn get_form(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<FormView> {
    state
        .controller
        .form_view(&session_id)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn submit_claim(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<StepOutcome> {
    let form = state
        .controller
        .form_view(&session_id)
        .await
        .map_err(flow_error)?;
    let snapshot = read_snapshot(multipart, &form).await?;

    let outcome = state
        .controller
        .submit(&session_id, snapshot)
        .await
        .map_err(flow_error)?;
    info!(
        session_id = %session_id,
        step = outcome.step.name(),
        "Submission handled"
    );
    Ok(Json(outcome))
}

/// Reads the browser's multipart body. Parts carrying a filename or posted
/// under a file control are files; checkbox controls become flags.
async fn read_snapshot(mut multipart: Multipart, form: &FormView) -> Result<FormSnapshot, ApiError> {
    let kinds: HashMap<&str, FieldKind> = form
        .controls
        .iter()
        .map(|c| (c.id.as_str(), c.kind))
        .collect();
    let mut snapshot = FormSnapshot::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("Invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let kind = kinds.get(name.as_str()).copied();
        let file_name = field.file_name().map(str::to_string);
        if file_name.is_some() || kind == Some(FieldKind::File) {
            let file_name = file_name.unwrap_or_default();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request_error(&format!("Failed to read file '{name}': {e}")))?;
            snapshot.push_file(name, Attachment::new(file_name, content_type, bytes.to_vec()));
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| bad_request_error(&format!("Failed to read field '{name}': {e}")))?;
        snapshot = match kind {
            Some(FieldKind::Checkbox) => {
                let checked = matches!(text.trim(), "on" | "true" | "1");
                snapshot.flag(name, checked)
            }
            _ => snapshot.text(name, text),
        };
    }

    Ok(snapshot)
}

async fn go_back(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StepOutcome> {
    state
        .controller
        .back(&session_id)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn reset_flow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StepOutcome> {
    state
        .controller
        .reset(&session_id)
        .await
        .map(Json)
        .map_err(flow_error)
}

async fn get_rating(State(state): State<AppState>) -> Json<RatingDisplay> {
    Json(feedback::load_rating(state.feedback.as_ref()).await)
}

async fn post_rating(
    State(state): State<AppState>,
    Json(form): Json<RatingForm>,
) -> ApiResult<RatingResponse> {
    let (submission, receipt) = feedback::submit_rating(state.feedback.as_ref(), form)
        .await
        .map_err(flow_error)?;
    Ok(Json(RatingResponse {
        message: submission.thanks(),
        receipt,
    }))
}

async fn get_testimonials(State(state): State<AppState>) -> Json<TestimonialsView> {
    Json(feedback::load_testimonials(state.feedback.as_ref()).await)
}

async fn build_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> ApiResult<QuoteResponse> {
    let url = request
        .whatsapp_link(&state.whatsapp_number)
        .map_err(flow_error)?;
    Ok(Json(QuoteResponse { url }))
}
