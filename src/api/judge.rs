use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::JudgeStatus;
use crate::repositories;
use crate::schemas::judge::{CustomTestCallback, JudgeCallback};
use crate::services::solve_stats;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/judge/callback", post(judge_callback))
        .route("/judge/custom-callback", post(custom_test_callback))
}

/// POST /judge/callback. The sandbox reports a judged submission. Sole
/// writer of judged-state fields; safe against duplicate and out-of-order
/// delivery: per-case rows are upserted by (submission, index) and the
/// statistics fold runs only on the first ingestion.
async fn judge_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<JudgeCallback>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers)?;

    let Some(status) = JudgeStatus::from_wire(&payload.status) else {
        return Err(ApiError::BadRequest(format!("Unknown judge status {:?}", payload.status)));
    };

    let mut case_statuses = Vec::with_capacity(payload.test_results.len());
    for entry in &payload.test_results {
        let Some(case_status) = JudgeStatus::from_wire(&entry.status) else {
            return Err(ApiError::BadRequest(format!(
                "Unknown test case status {:?}",
                entry.status
            )));
        };
        case_statuses.push(case_status);
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    // The row lock serializes this against a concurrent rejudge or retry
    // settlement for the same submission.
    let submission =
        repositories::submissions::find_by_id_for_update(&mut *tx, &payload.submission_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Submission {} not found", payload.submission_id))
            })?;

    let first_ingest = submission.judged_at.is_none();
    let judged_at = primitive_now_utc();

    repositories::submissions::apply_judge_result(
        &mut *tx,
        &submission.id,
        repositories::submissions::JudgedUpdate {
            status,
            score: payload.score,
            execution_time_ms: payload.execution_time,
            memory_kb: payload.memory_usage,
            judge_server: payload.judge_server.as_deref(),
            judged_at,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to apply judge result"))?;

    for (entry, case_status) in payload.test_results.iter().zip(case_statuses) {
        repositories::submission_results::upsert(
            &mut *tx,
            repositories::submission_results::UpsertResult {
                submission_id: &submission.id,
                test_case_id: entry.test_case_id,
                test_case_index: entry.test_case_index,
                status: case_status,
                execution_time_ms: entry.execution_time,
                memory_kb: entry.memory_usage,
                score: entry.score,
                max_score: entry.max_score,
                output_preview: entry.output.as_deref(),
                error_message: entry.error_message.as_deref(),
            },
            judged_at,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to upsert submission result"))?;
    }

    // The aggregate must count each judged submission exactly once; a
    // re-delivered callback only refreshes the rows above.
    if first_ingest {
        solve_stats::apply_judged_submission(
            &mut *tx,
            &solve_stats::JudgedSubmission {
                user_id: &submission.user_id,
                problem_id: submission.problem_id,
                status,
                score: payload.score,
                execution_time_ms: payload.execution_time,
                memory_kb: payload.memory_usage,
                submitted_at: submission.created_at,
                judged_at,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update solve statistics"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit judge result"))?;

    let outcome = if first_ingest { "ok" } else { "duplicate" };
    metrics::counter!("judge_callbacks_total", "status" => outcome).increment(1);
    tracing::info!(
        submission_id = %submission.id,
        status = ?status,
        score = payload.score,
        first_ingest,
        "Judge callback ingested"
    );

    Ok(Json(json!({ "detail": outcome })))
}

/// POST /judge/custom-callback. The sandbox finishes an ad-hoc custom test.
async fn custom_test_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CustomTestCallback>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers)?;

    repositories::custom_tests::find_by_id(state.db(), &payload.custom_test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load custom test"))?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Custom test {} not found", payload.custom_test_id))
        })?;

    let now = primitive_now_utc();
    let applied = match payload.status.as_str() {
        "finished" => repositories::custom_tests::finish(
            state.db(),
            &payload.custom_test_id,
            payload.stdout.as_deref(),
            payload.error.as_deref(),
            now,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to finish custom test"))?,
        "failed" => repositories::custom_tests::mark_failed(
            state.db(),
            &payload.custom_test_id,
            payload.error.as_deref().unwrap_or("custom test failed"),
            now,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fail custom test"))?,
        other => {
            return Err(ApiError::BadRequest(format!("Unknown custom test status {other:?}")));
        }
    };

    let outcome = if applied { "ok" } else { "duplicate" };
    metrics::counter!("custom_test_callbacks_total", "status" => outcome).increment(1);

    Ok(Json(json!({ "detail": outcome })))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = &state.settings().sandbox().callback_token;
    let provided = headers.get("x-api-key").and_then(|value| value.to_str().ok());

    if expected.is_empty() || provided != Some(expected.as_str()) {
        return Err(ApiError::Unauthorized("Invalid judge callback credentials"));
    }

    Ok(())
}
