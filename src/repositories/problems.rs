use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Problem;

const COLUMNS: &str = "\
    id, course_id, title, content_hash, time_limit_ms, memory_limit_mb, use_checker, \
    checker_name, use_static_analysis, created_at, updated_at";

pub(crate) struct CreateProblem<'a> {
    pub(crate) course_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) content_hash: &'a str,
    pub(crate) time_limit_ms: Option<i32>,
    pub(crate) memory_limit_mb: Option<i32>,
    pub(crate) use_checker: bool,
    pub(crate) checker_name: Option<&'a str>,
    pub(crate) use_static_analysis: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateProblem<'_>,
) -> Result<Problem, sqlx::Error> {
    sqlx::query_as::<_, Problem>(&format!(
        "INSERT INTO problems (course_id, title, content_hash, time_limit_ms, memory_limit_mb, \
         use_checker, checker_name, use_static_analysis, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
         RETURNING {COLUMNS}"
    ))
    .bind(params.course_id)
    .bind(params.title)
    .bind(params.content_hash)
    .bind(params.time_limit_ms)
    .bind(params.memory_limit_mb)
    .bind(params.use_checker)
    .bind(params.checker_name)
    .bind(params.use_static_analysis)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

/// Problem lookup as consumed by the judging pipeline. `None` means the
/// problem id does not resolve.
pub(crate) async fn find_by_id(
    pool: &PgPool,
    problem_id: i64,
) -> Result<Option<Problem>, sqlx::Error> {
    sqlx::query_as::<_, Problem>(&format!("SELECT {COLUMNS} FROM problems WHERE id = $1"))
        .bind(problem_id)
        .fetch_optional(pool)
        .await
}
