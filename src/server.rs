use crate::config::Settings;
use crate::predict::{EmotionPredictor, PredictionResult};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<EmotionPredictor>,
    pub settings: Arc<Settings>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    models_loaded: usize,
    available_models: Vec<String>,
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<String>,
    count: usize,
}

#[derive(Serialize)]
struct PredictionResponse {
    emotion: String,
    confidence: Option<f32>,
    model_used: String,
    processing_time_ms: f64,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Builds the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .route("/api/models", get(models_handler))
        .route("/api/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listener and serves requests until the process exits.
pub async fn serve(settings: Settings, predictor: Arc<EmotionPredictor>) -> std::io::Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState {
        predictor,
        settings: Arc::new(settings),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "emotion recognition server listening");
    axum::serve(listener, router).await
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Audio Emotion Recognition API",
        "version": API_VERSION,
        "health": "/api/health",
        "models": "/api/models",
    }))
}

async fn health_handler(State(state): State<AppState>) -> Response {
    match state.predictor.list_models() {
        Ok(models) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                models_loaded: models.len(),
                available_models: models,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            internal_error("service unhealthy".to_string())
        }
    }
}

async fn models_handler(State(state): State<AppState>) -> Response {
    match state.predictor.list_models() {
        Ok(models) => (
            StatusCode::OK,
            Json(ModelsResponse {
                count: models.len(),
                models,
            }),
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn predict_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let started = Instant::now();

    let mut file: Option<(String, Bytes)> = None;
    let mut model_name: Option<String> = None;
    let mut chorus_start: Option<f64> = None;
    let mut chorus_end: Option<f64> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed multipart body: {e}")),
        };
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((filename, bytes)),
                    Err(e) => return bad_request(format!("failed to read upload: {e}")),
                }
            }
            "model_name" => match field.text().await {
                Ok(text) => model_name = Some(text),
                Err(e) => return bad_request(format!("failed to read model_name: {e}")),
            },
            "chorus_start" => match read_seconds(field).await {
                Ok(value) => chorus_start = value,
                Err(response) => return response,
            },
            "chorus_end" => match read_seconds(field).await {
                Ok(value) => chorus_end = value,
                Err(response) => return response,
            },
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return bad_request("missing 'file' field".to_string());
    };
    if !state.settings.accepts_filename(&filename) {
        return bad_request(format!(
            "invalid file format, supported: {}",
            state.settings.allowed_extensions.join(", ")
        ));
    }
    let Some(model_name) = model_name else {
        return bad_request("missing 'model_name' field".to_string());
    };

    let available = match state.predictor.list_models() {
        Ok(models) => models,
        Err(e) => return internal_error(e.to_string()),
    };
    if !available.contains(&model_name) {
        return bad_request(format!(
            "model '{model_name}' not found, available models: {}",
            available.join(", ")
        ));
    }

    tracing::info!(file = %filename, model = %model_name, "processing prediction request");

    let suffix = Path::new(&filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_else(|| ".wav".to_string());
    let predictor = Arc::clone(&state.predictor);
    let model = model_name.clone();

    // Inference is CPU-bound; keep it off the async workers. The upload temp
    // file lives only for the duration of this closure.
    let outcome = tokio::task::spawn_blocking(move || -> std::io::Result<PredictionResult> {
        let mut upload = tempfile::Builder::new()
            .prefix("emorec_upload_")
            .suffix(&suffix)
            .tempfile()?;
        upload.write_all(&bytes)?;
        upload.flush()?;
        Ok(predictor.predict(&model, upload.path(), chorus_start, chorus_end))
    })
    .await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => return internal_error(format!("failed to persist upload: {e}")),
        Err(e) => return internal_error(format!("prediction task failed: {e}")),
    };

    let PredictionResult {
        emotion,
        confidence,
        error,
    } = result;
    match (emotion, error) {
        (Some(emotion), None) => (
            StatusCode::OK,
            Json(PredictionResponse {
                emotion,
                confidence,
                model_used: model_name,
                processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
        )
            .into_response(),
        (_, Some(error)) => internal_error(error),
        _ => internal_error("prediction produced no result".to_string()),
    }
}

async fn read_seconds(field: axum::extract::multipart::Field<'_>) -> Result<Option<f64>, Response> {
    let name = field.name().unwrap_or_default().to_string();
    let text = field
        .text()
        .await
        .map_err(|e| bad_request(format!("failed to read {name}: {e}")))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    text.trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|_| bad_request(format!("{name} must be a number of seconds")))
}

fn bad_request(detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "bad request".to_string(),
            detail: Some(detail),
        }),
    )
        .into_response()
}

fn internal_error(detail: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "prediction failed".to_string(),
            detail: Some(detail),
        }),
    )
        .into_response()
}
