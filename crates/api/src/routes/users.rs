//! User registration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{NewUser, User, UserId};
use store::ShopStore;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_id;

/// POST /users: register a customer or merchant profile.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.users.register_user(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user_id: UserId = parse_id(&id)?;
    Ok(Json(state.users.get_user(user_id).await?))
}
