use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::UserProblemStatus;
use crate::db::types::SolveStatus;

const COLUMNS: &str = "\
    user_id, problem_id, total_submissions, ac_submissions, best_score, first_solved_at, \
    last_submitted_at, solve_status, best_time_ms, best_memory_kb, total_time_ms, updated_at";

pub(crate) async fn find(
    pool: &PgPool,
    user_id: &str,
    problem_id: i64,
) -> Result<Option<UserProblemStatus>, sqlx::Error> {
    sqlx::query_as::<_, UserProblemStatus>(&format!(
        "SELECT {COLUMNS} FROM user_problem_status WHERE user_id = $1 AND problem_id = $2"
    ))
    .bind(user_id)
    .bind(problem_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn ensure_row(
    conn: &mut PgConnection,
    user_id: &str,
    problem_id: i64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_problem_status (user_id, problem_id, solve_status, updated_at)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (user_id, problem_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(problem_id)
    .bind(SolveStatus::NeverTried)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// The count columns are the part of the aggregate that must survive any
/// concurrency, so they move through SQL-level increments, never
/// read-modify-write in application memory.
pub(crate) struct CounterIncrement<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) problem_id: i64,
    pub(crate) accepted: bool,
    pub(crate) execution_time_ms: i32,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) judged_at: PrimitiveDateTime,
}

pub(crate) async fn increment_counters(
    conn: &mut PgConnection,
    params: CounterIncrement<'_>,
) -> Result<UserProblemStatus, sqlx::Error> {
    sqlx::query_as::<_, UserProblemStatus>(&format!(
        "UPDATE user_problem_status
         SET total_submissions = total_submissions + 1,
             ac_submissions = ac_submissions + CASE WHEN $1 THEN 1 ELSE 0 END,
             first_solved_at = COALESCE(first_solved_at, CASE WHEN $1 THEN $2 END),
             last_submitted_at = $3,
             total_time_ms = total_time_ms + CASE WHEN $4 > 0 THEN $4 ELSE 0 END,
             updated_at = $2
         WHERE user_id = $5 AND problem_id = $6
         RETURNING {COLUMNS}"
    ))
    .bind(params.accepted)
    .bind(params.judged_at)
    .bind(params.submitted_at)
    .bind(params.execution_time_ms)
    .bind(params.user_id)
    .bind(params.problem_id)
    .fetch_one(conn)
    .await
}

pub(crate) struct BestValues {
    pub(crate) best_score: i32,
    pub(crate) best_time_ms: Option<i32>,
    pub(crate) best_memory_kb: Option<i64>,
    pub(crate) solve_status: SolveStatus,
}

pub(crate) async fn persist_bests(
    conn: &mut PgConnection,
    user_id: &str,
    problem_id: i64,
    values: BestValues,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE user_problem_status
         SET best_score = $1,
             best_time_ms = $2,
             best_memory_kb = $3,
             solve_status = $4,
             updated_at = $5
         WHERE user_id = $6 AND problem_id = $7",
    )
    .bind(values.best_score)
    .bind(values.best_time_ms)
    .bind(values.best_memory_kb)
    .bind(values.solve_status)
    .bind(now)
    .bind(user_id)
    .bind(problem_id)
    .execute(conn)
    .await?;
    Ok(())
}
