use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::repositories;
use crate::schemas::auth::{LoginRequest, TokenResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = repositories::users::find_by_username(state.db(), &payload.username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("Incorrect username or password"))?;

    let verified = security::verify_password(&payload.password, &user.hashed_password)
        .map_err(|e| ApiError::internal(e, "Password verification failed"))?;

    if !verified || !user.is_active {
        return Err(ApiError::Unauthorized("Incorrect username or password"));
    }

    let access_token = security::create_access_token(&user.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    Ok(Json(TokenResponse { access_token, token_type: "bearer".to_string() }))
}
