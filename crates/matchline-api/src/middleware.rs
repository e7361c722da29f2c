use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use matchline_types::CoreError;
use matchline_types::api::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Reads the verified user id the auth layer put in the identity header.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = req
        .headers()
        .get(&state.identity_header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<Uuid>().ok())
        .ok_or(ApiError(CoreError::Unauthorized))?;

    req.extensions_mut().insert(Identity { user_id });
    Ok(next.run(req).await)
}
