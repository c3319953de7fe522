use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{can_view_submission, require_course_staff_for_problem, CurrentUser};
use crate::core::hashing::sha256_hex;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{JudgeStatus, Language};
use crate::repositories;
use crate::schemas::submission::{
    to_problem_status_response, to_submission_response, AttachCodeRequest,
    CreateSubmissionRequest, ProblemStatusResponse, SubmissionResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/problems/:problem_id/submissions", post(create_submission))
        .route("/problems/:problem_id/my-status", get(my_problem_status))
        .route("/submissions/:submission_id", get(get_submission))
        .route("/submissions/:submission_id/code", put(attach_code))
        .route("/submissions/:submission_id/rejudge", post(rejudge_submission))
}

/// POST /problems/:id/submissions. Creates an empty shell in
/// `awaiting_code`; the source arrives through the PUT below.
async fn create_submission(
    Path(problem_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let Some(language) = Language::parse(&payload.language) else {
        return Err(ApiError::BadRequest(format!(
            "Unsupported language {:?}; expected one of {}",
            payload.language,
            Language::supported_names().join(", ")
        )));
    };

    repositories::problems::find_by_id(state.db(), problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve problem"))?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {problem_id} not found")))?;

    let attempts = repositories::submissions::count_by_user_problem(state.db(), &user.id, problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count prior attempts"))?;

    let submission = repositories::submissions::create(
        state.db(),
        repositories::submissions::CreateSubmission {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            problem_id,
            language,
            ip_address: header_value(&headers, "x-forwarded-for"),
            user_agent: header_value(&headers, "user-agent"),
            is_late: false,
            attempt_number: (attempts + 1) as i32,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create submission"))?;

    tracing::info!(
        submission_id = %submission.id,
        problem_id,
        user_id = %user.id,
        language = ?language,
        "Submission created"
    );

    Ok((StatusCode::CREATED, Json(to_submission_response(submission, Vec::new()))))
}

/// PUT /submissions/:id/code. One-shot code upload: moves the submission to
/// `pending` and arms the dispatch queue; the commit is what publishes the
/// job to the workers, so dispatch can never observe an uncommitted upload.
async fn attach_code(
    Path(submission_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AttachCodeRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Invalid source code: {e}")))?;

    let max_source_bytes = state.settings().judging().max_source_bytes;
    if payload.source_code.len() > max_source_bytes {
        return Err(ApiError::BadRequest(format!(
            "Source code exceeds {max_source_bytes} bytes"
        )));
    }

    if payload.source_code.trim().is_empty() {
        return Err(ApiError::BadRequest("Source code must not be empty".to_string()));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let submission = repositories::submissions::find_by_id_for_update(&mut *tx, &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {submission_id} not found")))?;

    if submission.user_id != user.id {
        return Err(ApiError::Forbidden("Only the submission owner may upload code"));
    }

    match submission.status {
        JudgeStatus::AwaitingCode => {}
        JudgeStatus::Pending => {
            return Err(ApiError::Conflict("Code has already been uploaded".to_string()));
        }
        _ => {
            return Err(ApiError::Conflict("Submission has already been judged".to_string()));
        }
    }

    if !submission.source_code.is_empty() {
        return Err(ApiError::Conflict("Code has already been uploaded".to_string()));
    }

    let code_hash = sha256_hex(payload.source_code.as_bytes());
    let duplicate = repositories::submissions::code_hash_exists(
        &mut *tx,
        &user.id,
        submission.problem_id,
        &code_hash,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to check for duplicate code"))?;

    if duplicate {
        return Err(ApiError::Conflict(
            "Identical code was already submitted for this problem".to_string(),
        ));
    }

    repositories::submissions::attach_code(
        &mut *tx,
        &submission_id,
        &payload.source_code,
        &code_hash,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to attach code"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit code upload"))?;

    metrics::counter!("submissions_queued_total").increment(1);
    tracing::info!(submission_id = %submission_id, user_id = %user.id, "Code uploaded; dispatch armed");

    let submission = repositories::submissions::find_by_id(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to reload submission"))?
        .ok_or_else(|| ApiError::Internal("Submission missing after upload".to_string()))?;

    Ok(Json(to_submission_response(submission, Vec::new())))
}

/// POST /submissions/:id/rejudge, staff only. Clears per-case results,
/// resets the judged fields to their sentinels, and re-arms dispatch.
async fn rejudge_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = repositories::submissions::find_by_id(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {submission_id} not found")))?;

    require_course_staff_for_problem(&state, &user, submission.problem_id).await?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let submission = repositories::submissions::find_by_id_for_update(&mut *tx, &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {submission_id} not found")))?;

    if submission.source_code.trim().is_empty() {
        return Err(ApiError::BadRequest("Submission has no source code".to_string()));
    }

    let deleted = repositories::submission_results::delete_by_submission(&mut *tx, &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to clear prior results"))?;

    repositories::submissions::rejudge_reset(&mut *tx, &submission_id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to reset submission"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit rejudge"))?;

    metrics::counter!("submissions_rejudged_total").increment(1);
    tracing::info!(
        submission_id = %submission_id,
        requested_by = %user.id,
        cleared_results = deleted,
        "Submission queued for rejudge"
    );

    let submission = repositories::submissions::find_by_id(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to reload submission"))?
        .ok_or_else(|| ApiError::Internal("Submission missing after rejudge".to_string()))?;

    Ok(Json(to_submission_response(submission, Vec::new())))
}

async fn get_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = repositories::submissions::find_by_id(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {submission_id} not found")))?;

    if !can_view_submission(&state, &user, &submission).await? {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let results = repositories::submission_results::list_by_submission(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission results"))?;

    Ok(Json(to_submission_response(submission, results)))
}

async fn my_problem_status(
    Path(problem_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ProblemStatusResponse>, ApiError> {
    repositories::problems::find_by_id(state.db(), problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve problem"))?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {problem_id} not found")))?;

    let status = repositories::solve_stats::find(state.db(), &user.id, problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load solve status"))?;

    let response = match status {
        Some(status) => to_problem_status_response(status),
        None => ProblemStatusResponse {
            problem_id,
            total_submissions: 0,
            ac_submissions: 0,
            best_score: 0,
            solve_status: crate::db::types::SolveStatus::NeverTried,
            best_time_ms: None,
            best_memory_kb: None,
            total_time_ms: 0,
            first_solved_at: None,
            last_submitted_at: None,
        },
    };

    Ok(Json(response))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
