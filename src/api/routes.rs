use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{error, info, info_span, Instrument, Span};
use uuid::Uuid;

use super::types::*;
use super::AppState;
use crate::device::device_info;
use crate::error::{InferenceError, Result};
use crate::generation::TextGenerator;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", get(query))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, error) = match &state.model {
        Ok(_) => ("ok", None),
        Err(e) => ("degraded", Some(e.clone())),
    };

    Json(HealthResponse {
        status: status.to_string(),
        model: state.model_id.clone(),
        device: device_info(&state.device),
        error,
    })
}

fn unprocessable(message: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(QueryResponse::error(message)),
    )
        .into_response()
}

/// Bad parameters get a 422; any later failure is reported as `{"error": ...}` with 200.
async fn query(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<QueryParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => return unprocessable(rejection.body_text()),
    };
    let Some(text) = params.text else {
        return unprocessable("missing query parameter: text");
    };

    let span = info_span!("query", request_id = %Uuid::new_v4());
    async move {
        info!("Received query: {}", text);

        match generate(&state, text).await {
            Ok(response) => {
                info!("Response: {}", response);
                Json(QueryResponse::Generated { response }).into_response()
            }
            Err(e) => {
                error!("Inference failed: {}", e);
                Json(QueryResponse::error(e.to_string())).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn generate(state: &AppState, text: String) -> Result<String> {
    let loaded = state
        .model
        .clone()
        .map_err(InferenceError::ModelUnavailable)?;
    let device = state.device.clone();
    let config = state.generation.clone();
    let span = Span::current();

    tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let mut model = loaded.model.blocking_lock();
            let mut generator = TextGenerator::new(model.as_mut(), &loaded.tokenizer, &device);
            generator.generate(&text, &config).map(|output| output.text)
        })
    })
    .await
    .map_err(|e| InferenceError::Inference(format!("generation task failed: {}", e)))?
}
