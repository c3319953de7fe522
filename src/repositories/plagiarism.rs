use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::PlagiarismReport;
use crate::db::types::{Language, PlagiarismStatus};

const COLUMNS: &str = "\
    id, problem_id, requested_by, language, status, report_url, error, created_at, finished_at";

pub(crate) async fn create(
    pool: &PgPool,
    id: &str,
    problem_id: i64,
    requested_by: &str,
    language: Language,
    now: PrimitiveDateTime,
) -> Result<PlagiarismReport, sqlx::Error> {
    sqlx::query_as::<_, PlagiarismReport>(&format!(
        "INSERT INTO plagiarism_reports (id, problem_id, requested_by, language, status, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(problem_id)
    .bind(requested_by)
    .bind(language)
    .bind(PlagiarismStatus::Pending)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// The single-flight gate reads the most recent report for the problem; a
/// `pending` one blocks new triggers.
pub(crate) async fn latest_for_problem(
    pool: &PgPool,
    problem_id: i64,
) -> Result<Option<PlagiarismReport>, sqlx::Error> {
    sqlx::query_as::<_, PlagiarismReport>(&format!(
        "SELECT {COLUMNS}
         FROM plagiarism_reports
         WHERE problem_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .bind(problem_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn count_pending_for_problem(
    pool: &PgPool,
    problem_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM plagiarism_reports WHERE problem_id = $1 AND status = $2",
    )
    .bind(problem_id)
    .bind(PlagiarismStatus::Pending)
    .fetch_one(pool)
    .await
}

pub(crate) async fn mark_success(
    pool: &PgPool,
    id: &str,
    report_url: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE plagiarism_reports
         SET status = $1, report_url = $2, finished_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(PlagiarismStatus::Success)
    .bind(report_url)
    .bind(now)
    .bind(id)
    .bind(PlagiarismStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE plagiarism_reports
         SET status = $1, error = $2, finished_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(PlagiarismStatus::Failed)
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(PlagiarismStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fail `pending` reports older than `cutoff`; a crashed worker thread must
/// not hold the single-flight gate forever. Returns the failed ids.
pub(crate) async fn fail_stale_pending(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE plagiarism_reports
         SET status = $1, error = 'check worker did not finish', finished_at = $2
         WHERE status = $3 AND created_at < $4
         RETURNING id",
    )
    .bind(PlagiarismStatus::Failed)
    .bind(now)
    .bind(PlagiarismStatus::Pending)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}
