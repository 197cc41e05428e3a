use axum::{
    extract::{rejection::JsonRejection, Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::models::{HealthResponse, SendToListRequest, SendToListResponse, SummarizeRequest, SummarizeResponse};
use crate::api::response;
use crate::error::{AppError, ListIntegrationError, Result};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/summarize", post(summarize_handler))
        .route("/api/send_to_list", post(send_to_list_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn summarize_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload.map_err(bad_body)?;
    let url = req.url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidInput("url must not be empty".to_string()));
    }

    let started = Instant::now();
    let result = state.summarizer.summarize(url).await.inspect_err(|err| {
        warn!(url, category = ?err.category(), error = %err, "Summarize request failed");
    })?;
    info!(url, elapsed_ms = started.elapsed().as_millis() as u64, "Summarize request done");

    Ok(response::success(SummarizeResponse::from(result)))
}

async fn send_to_list_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendToListRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload.map_err(bad_body)?;
    let outcome = state
        .summarizer
        .send_to_list(req.original_url.trim(), &req.summary_markdown)
        .await?;
    let list = state.summarizer.list_name().unwrap_or_default().to_string();

    if !outcome.success {
        warn!(stage = ?outcome.stage, error = ?outcome.error_message, "Send to list failed");
        let err = outcome.error.unwrap_or_else(|| {
            ListIntegrationError::ItemCreationFailed(outcome.error_message.unwrap_or_default())
        });
        return Err(err.into());
    }

    let (status, mut body) = response::success(SendToListResponse {
        list: list.clone(),
        item_id: outcome.external_item_id,
    });
    body.0.message = Some(format!("Summary sent to list '{}'", list));
    Ok((status, body))
}

/// Malformed or incomplete request bodies get the same envelope as other client errors.
fn bad_body(rejection: JsonRejection) -> AppError {
    AppError::InvalidInput(rejection.body_text())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(HealthResponse {
        llm_backend: state.summarizer.llm_backend(),
        lists_enabled: state.summarizer.lists_enabled(),
    })
}
