//! Chat completions endpoint
//!
//! OpenAI-compatible chat completions API endpoint.
//! Handles both streaming and non-streaming responses.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info, warn};

use crate::{
    credential::{fingerprint, resolve_credential},
    error::AppError,
    openai::ChatCompletionRequest,
    routes::metrics::record_request,
    streaming::{complete, stream_completion, SessionGuard},
    translate::{translate_request, TranslatedRequest},
    AppState,
};

/// Handle chat completion requests
///
/// The body is taken as raw bytes so that malformed JSON is reported in the
/// OpenAI error shape rather than axum's default rejection.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let start_time = Instant::now();

    let request: ChatCompletionRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Rejected request body");
        AppError::BadRequest("Invalid request body".to_string())
    })?;

    let credential = resolve_credential(&headers, request.api_key.as_deref());
    let client = state.pool.resolve_client(&credential).await?;

    if request.model.is_empty() {
        return Err(AppError::BadRequest("Model is required".to_string()));
    }
    if request.messages.is_empty() {
        return Err(AppError::BadRequest("Messages are required".to_string()));
    }

    info!(
        model = %request.model,
        stream = %request.stream,
        messages = %request.messages.len(),
        tools = %request.tools.len(),
        credential = %fingerprint(&credential),
        "Processing chat completion request"
    );

    let TranslatedRequest { config, prompt } = translate_request(&request);

    let session = client.create_session(&config).await.map_err(|e| {
        warn!(model = %request.model, error = %e, "Failed to create session");
        AppError::Internal("Failed to create session".to_string())
    })?;
    let guard = SessionGuard::new(session);
    let timeout = state.config.request_timeout;

    let result = if request.stream {
        stream_completion(guard, &prompt, &request.model, timeout).await
    } else {
        complete(guard, &prompt, &request.model, timeout)
            .await
            .map(|response| Json(response).into_response())
    };

    let duration = start_time.elapsed().as_secs_f64();
    match &result {
        Ok(_) => {
            record_request("success", &request.model, duration);
            info!(
                model = %request.model,
                duration_secs = duration,
                "Chat completion request completed"
            );
        }
        Err(e) => {
            record_request("error", &request.model, duration);
            warn!(
                model = %request.model,
                status = %e.status_code(),
                error = %e,
                "Chat completion request failed"
            );
        }
    }

    result
}
