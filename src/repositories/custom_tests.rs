use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::CustomTest;
use crate::db::types::{CustomRunStatus, Language};

const COLUMNS: &str = "\
    id, user_id, problem_id, language, source_code, stdin, status, stdout_preview, error, \
    dispatch_attempts, dispatch_started_at, next_dispatch_at, created_at, finished_at";

pub(crate) struct CreateCustomTest<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) problem_id: Option<i64>,
    pub(crate) language: Language,
    pub(crate) source_code: &'a str,
    pub(crate) stdin: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateCustomTest<'_>,
) -> Result<CustomTest, sqlx::Error> {
    sqlx::query_as::<_, CustomTest>(&format!(
        "INSERT INTO custom_tests (id, user_id, problem_id, language, source_code, stdin, \
         next_dispatch_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.problem_id)
    .bind(params.language)
    .bind(params.source_code)
    .bind(params.stdin)
    .bind(params.created_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<CustomTest>, sqlx::Error> {
    sqlx::query_as::<_, CustomTest>(&format!("SELECT {COLUMNS} FROM custom_tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn claim_next_for_dispatch(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id FROM custom_tests
            WHERE status = $1
              AND dispatch_started_at IS NULL
              AND (next_dispatch_at IS NULL OR next_dispatch_at <= $2)
            ORDER BY dispatch_attempts, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE custom_tests
        SET dispatch_started_at = $2,
            dispatch_attempts = dispatch_attempts + 1
        FROM candidate
        WHERE custom_tests.id = candidate.id
        RETURNING custom_tests.id",
    )
    .bind(CustomRunStatus::Pending)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn rearm_dispatch(
    pool: &PgPool,
    id: &str,
    next_dispatch_at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE custom_tests
         SET dispatch_started_at = NULL,
             next_dispatch_at = $1
         WHERE id = $2 AND status = $3",
    )
    .bind(next_dispatch_at)
    .bind(id)
    .bind(CustomRunStatus::Pending)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE custom_tests
         SET status = $1, error = $2, finished_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(CustomRunStatus::Failed)
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(CustomRunStatus::Pending)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn finish(
    pool: &PgPool,
    id: &str,
    stdout_preview: Option<&str>,
    error: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE custom_tests
         SET status = $1, stdout_preview = $2, error = $3, finished_at = $4
         WHERE id = $5 AND status = $6",
    )
    .bind(CustomRunStatus::Finished)
    .bind(stdout_preview)
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(CustomRunStatus::Pending)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn recover_stale_dispatches(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE custom_tests
         SET dispatch_started_at = NULL,
             next_dispatch_at = $1
         WHERE status = $2
           AND dispatch_started_at IS NOT NULL
           AND dispatch_started_at < $3
         RETURNING id",
    )
    .bind(now)
    .bind(CustomRunStatus::Pending)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}
