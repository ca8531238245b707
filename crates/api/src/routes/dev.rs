//! Session helpers for the in-memory backend.
//!
//! In production sessions come from the auth service. With
//! `MARKETPLACE_STORAGE=memory` these routes let demos and tests sign in as
//! any user id. They are never mounted with the `PostgreSQL` backend.

use axum::{Json, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;

use marketplace_core::UserId;

use crate::error::{AppError, Result};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub user_id: UserId,
}

/// POST /dev/session
pub async fn sign_in(session: Session, Json(body): Json<SignInRequest>) -> Result<StatusCode> {
    // New identity, new session id.
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    set_current_user(&session, &CurrentUser { id: body.user_id })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    tracing::debug!(user_id = %body.user_id, "Signed in");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /dev/session
pub async fn sign_out(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
