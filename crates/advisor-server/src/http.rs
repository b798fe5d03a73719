// HTTP surface: multipart upload endpoints, health check, CORS and tracing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use advisor_core::config::ServerConfig;
use advisor_core::dataset::Dataset;
use advisor_core::request::{non_blank, parse_questions, split_list, AnalysisRequest, DynamicRequest};
use advisor_core::response::ApiResponse;

use crate::engine::{AnalysisError, AnalyticsEngine};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
}

impl AppState {
    pub fn new(engine: AnalyticsEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Request-level failures. Pipeline failures are not errors at this layer;
/// they are reported inside a 200 envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Field required: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    Rejected(#[from] MultipartRejection),

    #[error("{0}")]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected(r) => r.status(),
            ApiError::Multipart(e) => e.status(),
        };
        debug!(%status, error = %self, "rejected request");
        (status, Json(ApiResponse::<Value>::failure(self.to_string()))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// CORS for the browser form: listed origins, credentials, any method/header.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, InvalidHeaderValue> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn router(state: AppState, server: &ServerConfig) -> Result<Router, InvalidHeaderValue> {
    Ok(Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/analyze-dynamic", post(analyze_dynamic))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<Value> {
    let llm = if state.engine.llm_enabled() {
        "active"
    } else {
        "disabled"
    };
    Json(json!({ "status": "ok", "llm": llm }))
}

async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart?).await?;
    let file = form.file()?;
    let request = AnalysisRequest {
        business_model: form.require("business_model")?,
        value_proposition: form.require("value_proposition")?,
        target_metrics: split_list(&form.require("target_metrics")?),
        revenue_drivers: split_list(&form.require("revenue_drivers")?),
    };

    let result = match Dataset::from_reader(&file[..]) {
        Ok(dataset) => state.engine.analyze(&dataset, &request).await,
        Err(e) => Err(e.into()),
    };
    Ok(envelope("/analyze", result))
}

async fn analyze_dynamic(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut form = UploadForm::read(multipart?).await?;
    let file = form.file()?;
    let request = DynamicRequest {
        business_model: form.require("business_model")?,
        value_proposition: form.require("value_proposition")?,
        business_goal: non_blank(form.take("business_goal")),
        questions: form
            .take("questions")
            .map(|q| parse_questions(&q))
            .unwrap_or_default(),
    };

    let result = match Dataset::from_reader(&file[..]) {
        Ok(dataset) => state.engine.analyze_dynamic(&dataset, &request).await,
        Err(e) => Err(e.into()),
    };
    Ok(envelope("/analyze-dynamic", result))
}

fn envelope<T: Serialize>(route: &str, result: Result<T, AnalysisError>) -> Response {
    match result {
        Ok(data) => Json(ApiResponse::ok(data)).into_response(),
        Err(e) => {
            error!(route, error = %e, "analysis failed");
            Json(ApiResponse::<T>::failure(format!("Error processing data: {e}"))).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Multipart form
// ---------------------------------------------------------------------------

/// Text fields plus the uploaded file from one multipart body.
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<Bytes>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut fields = HashMap::new();
        let mut file = None;
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                file = Some(field.bytes().await?);
            } else {
                let text = field.text().await?;
                fields.insert(name, text);
            }
        }
        Ok(UploadForm { fields, file })
    }

    fn file(&mut self) -> Result<Bytes, ApiError> {
        self.file.take().ok_or(ApiError::MissingField("file"))
    }

    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    /// A required text field; blank counts as missing.
    fn require(&mut self, name: &'static str) -> Result<String, ApiError> {
        non_blank(self.take(name)).ok_or(ApiError::MissingField(name))
    }
}
