//! Models endpoint
//!
//! Lists the models the caller's backend client can use.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use tracing::{debug, warn};

use crate::{
    credential::credential_from_headers,
    error::{AppError, AppResult},
    openai::{ModelData, ModelsResponse},
    streaming::unix_timestamp,
    AppState,
};

const OWNED_BY: &str = "github-copilot";

/// List available models
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<ModelsResponse>> {
    let credential = credential_from_headers(&headers);
    let client = state.pool.resolve_client(&credential).await?;

    let models = client.list_models().await.map_err(|e| {
        warn!(error = %e, "Failed to list models");
        AppError::Internal("Failed to list models".to_string())
    })?;
    debug!(count = models.len(), "Listed models");

    let created = unix_timestamp();
    let data = models
        .into_iter()
        .map(|model| ModelData {
            id: model.id,
            object: "model".to_string(),
            created,
            owned_by: OWNED_BY.to_string(),
        })
        .collect();

    Ok(Json(ModelsResponse {
        object: "list".to_string(),
        data,
    }))
}
