use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::SubmissionResult;
use crate::db::types::JudgeStatus;

const COLUMNS: &str = "\
    id, submission_id, test_case_id, test_case_index, status, execution_time_ms, memory_kb, \
    score, max_score, output_preview, error_message, created_at, updated_at";

pub(crate) struct UpsertResult<'a> {
    pub(crate) submission_id: &'a str,
    pub(crate) test_case_id: Option<i64>,
    pub(crate) test_case_index: i32,
    pub(crate) status: JudgeStatus,
    pub(crate) execution_time_ms: Option<i32>,
    pub(crate) memory_kb: Option<i64>,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) output_preview: Option<&'a str>,
    pub(crate) error_message: Option<&'a str>,
}

/// Idempotent write keyed by (submission, test_case_index): the sandbox may
/// re-deliver a callback, so a repeated index updates the existing row
/// instead of duplicating it.
pub(crate) async fn upsert(
    conn: &mut PgConnection,
    params: UpsertResult<'_>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO submission_results (submission_id, test_case_id, test_case_index, status, \
         execution_time_ms, memory_kb, score, max_score, output_preview, error_message, \
         created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
         ON CONFLICT (submission_id, test_case_index) DO UPDATE
         SET test_case_id = EXCLUDED.test_case_id,
             status = EXCLUDED.status,
             execution_time_ms = EXCLUDED.execution_time_ms,
             memory_kb = EXCLUDED.memory_kb,
             score = EXCLUDED.score,
             max_score = EXCLUDED.max_score,
             output_preview = EXCLUDED.output_preview,
             error_message = EXCLUDED.error_message,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(params.submission_id)
    .bind(params.test_case_id)
    .bind(params.test_case_index)
    .bind(params.status)
    .bind(params.execution_time_ms)
    .bind(params.memory_kb)
    .bind(params.score)
    .bind(params.max_score)
    .bind(params.output_preview)
    .bind(params.error_message)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn list_by_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Vec<SubmissionResult>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionResult>(&format!(
        "SELECT {COLUMNS}
         FROM submission_results
         WHERE submission_id = $1
         ORDER BY test_case_index"
    ))
    .bind(submission_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn delete_by_submission(
    conn: &mut PgConnection,
    submission_id: &str,
) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM submission_results WHERE submission_id = $1")
        .bind(submission_id)
        .execute(conn)
        .await?;
    Ok(deleted.rows_affected())
}

pub(crate) async fn count_by_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submission_results WHERE submission_id = $1",
    )
    .bind(submission_id)
    .fetch_one(pool)
    .await
}
