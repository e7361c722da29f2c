use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use matchline_gateway::run_blocking;
use matchline_types::CoreError;
use matchline_types::api::{Identity, UserBio, UserSummary};
use matchline_types::models::User;

use crate::error::ApiResult;
use crate::state::AppState;

/// Loads `target` if `viewer` may see it. Hidden profiles read as missing.
fn visible_profile(state: &AppState, viewer: Uuid, target: Uuid) -> Result<User, CoreError> {
    if !state.recommender.can_view_profile(viewer, target)? {
        return Err(CoreError::not_found("user not found"));
    }
    state
        .db
        .get_user(target)?
        .ok_or_else(|| CoreError::not_found("user not found"))
}

pub async fn user_summary(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(target): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let user = run_blocking(move || visible_profile(&st, identity.user_id, target)).await?;
    Ok(Json(UserSummary::from(&user)))
}

pub async fn user_bio(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(target): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let user = run_blocking(move || visible_profile(&st, identity.user_id, target)).await?;
    Ok(Json(UserBio::from(&user)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let user = run_blocking(move || {
        db.get_user(identity.user_id)?
            .ok_or_else(|| CoreError::not_found("user not found"))
    })
    .await?;
    Ok(Json(user))
}
