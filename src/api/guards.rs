use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::{Submission, User};
use crate::db::types::CourseRole;
use crate::repositories;

pub(crate) struct CurrentUser(pub(crate) User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

        let Some(user) = user else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        if !user.is_active {
            return Err(ApiError::Unauthorized("Invalid authentication credentials"));
        }

        Ok(CurrentUser(user))
    }
}

/// Is the caller staff (teacher) for the course that owns the problem?
/// Platform admins pass everywhere. Errors with `NotFound` when the problem
/// id does not resolve so callers get the same answer as the dispatch path.
pub(crate) async fn require_course_staff_for_problem(
    state: &AppState,
    user: &User,
    problem_id: i64,
) -> Result<(), ApiError> {
    let problem = repositories::problems::find_by_id(state.db(), problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve problem"))?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {problem_id} not found")))?;

    if user.is_platform_admin {
        return Ok(());
    }

    let role = repositories::courses::member_role(state.db(), &problem.course_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch course membership"))?;

    if role == Some(CourseRole::Teacher) {
        return Ok(());
    }

    Err(ApiError::Forbidden("Course staff access required"))
}

/// A submission is visible to its owner and to course staff of its problem.
pub(crate) async fn can_view_submission(
    state: &AppState,
    user: &User,
    submission: &Submission,
) -> Result<bool, ApiError> {
    if submission.user_id == user.id || user.is_platform_admin {
        return Ok(true);
    }

    let Some(problem) = repositories::problems::find_by_id(state.db(), submission.problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve problem"))?
    else {
        return Ok(false);
    };

    let role = repositories::courses::member_role(state.db(), &problem.course_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch course membership"))?;

    Ok(role == Some(CourseRole::Teacher))
}
