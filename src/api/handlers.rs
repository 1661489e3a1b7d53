//! HTTP handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::{GeneratedItem, ItemStore, Profile, ProfileStore};
use crate::error::{AppError, Result};
use crate::middleware::Identity;
use crate::service::{toggle_like, LikeAction};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct LikeBody {
    #[serde(rename = "itemId", alias = "item_id", alias = "emojiId")]
    pub item_id: String,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub database: &'static str,
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

/// `POST /generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GeneratedItem>> {
    let body = json_body(payload)?;
    info!(user_id = %identity.user_id, "Received generate request");

    let item = state
        .pipeline
        .generate(&state.db, &body.prompt, &identity.user_id)
        .await
        .map_err(|e| {
            error!(user_id = %identity.user_id, error = %e, "Generation failed");
            e
        })?;

    Ok(Json(item))
}

/// `POST /like`
pub async fn like(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<LikeBody>, JsonRejection>,
) -> Result<Json<GeneratedItem>> {
    let body = json_body(payload)?;
    let action: LikeAction = body.action.parse()?;

    let item = toggle_like(
        &state.db,
        state.settings.likes.consistency,
        &body.item_id,
        &identity.user_id,
        action,
    )
    .await
    .map_err(|e| {
        error!(item_id = %body.item_id, user_id = %identity.user_id, error = %e, "Like toggle failed");
        e
    })?;

    Ok(Json(item))
}

/// `GET /items`
pub async fn list_items(State(state): State<Arc<AppState>>) -> Result<Json<Vec<GeneratedItem>>> {
    Ok(Json(state.db.list_items().await?))
}

/// `GET /items/:id/download`
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let item = state
        .db
        .get_item(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item '{}'", id)))?;

    // Redirect::temporary panics on a value that is not a valid header
    HeaderValue::try_from(item.image_url.as_str()).map_err(|_| {
        error!(item_id = %id, "Stored image URL is not a valid Location header");
        AppError::Internal(format!("Item '{}' has an unusable image URL", id))
    })?;
    Ok(Redirect::temporary(&item.image_url))
}

/// `GET /me`
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Profile>> {
    Ok(Json(state.db.get_or_create_profile(&identity.user_id).await?))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            error!(error = %e, "Database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
        }
    }
}
