//! Model listing endpoint.

use axum::extract::State;
use axum::Json;

use lmchat_types::api::{Envelope, ModelIds};

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /models
///
/// Chat-capable models loaded in LM Studio; embedding models are left out.
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Envelope<ModelIds>>, AppError> {
    let models = state.session.list_models().await?;
    Ok(Json(Envelope::success(ModelIds { models })))
}
