use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::{JudgeStatus, Language};

const COLUMNS: &str = "\
    id, user_id, problem_id, language, source_code, code_hash, status, score, max_score, \
    execution_time_ms, memory_kb, ip_address, user_agent, is_late, has_penalty, \
    attempt_number, judge_server, dispatch_attempts, dispatch_started_at, next_dispatch_at, \
    created_at, judged_at";

pub(crate) struct CreateSubmission<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) problem_id: i64,
    pub(crate) language: Language,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) user_agent: Option<&'a str>,
    pub(crate) is_late: bool,
    pub(crate) attempt_number: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) struct JudgedUpdate<'a> {
    pub(crate) status: JudgeStatus,
    pub(crate) score: i32,
    pub(crate) execution_time_ms: i32,
    pub(crate) memory_kb: i64,
    pub(crate) judge_server: Option<&'a str>,
    pub(crate) judged_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateSubmission<'_>,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (id, user_id, problem_id, language, ip_address, user_agent, \
         is_late, attempt_number, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.problem_id)
    .bind(params.language)
    .bind(params.ip_address)
    .bind(params.user_agent)
    .bind(params.is_late)
    .bind(params.attempt_number)
    .bind(params.created_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(submission_id)
        .fetch_optional(pool)
        .await
}

/// Row-locked load. Every writer of judged-state fields (code upload, retry
/// settlement, callback ingestion, rejudge) goes through this inside a
/// transaction.
pub(crate) async fn find_by_id_for_update(
    conn: &mut PgConnection,
    submission_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE id = $1 FOR UPDATE"
    ))
    .bind(submission_id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn count_by_user_problem(
    pool: &PgPool,
    user_id: &str,
    problem_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submissions WHERE user_id = $1 AND problem_id = $2",
    )
    .bind(user_id)
    .bind(problem_id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn code_hash_exists(
    conn: &mut PgConnection,
    user_id: &str,
    problem_id: i64,
    code_hash: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM submissions
            WHERE user_id = $1 AND problem_id = $2 AND code_hash = $3
        )",
    )
    .bind(user_id)
    .bind(problem_id)
    .bind(code_hash)
    .fetch_one(conn)
    .await
}

/// Attach source code and arm the dispatch queue. The caller holds the row
/// lock and has already validated ownership and state.
pub(crate) async fn attach_code(
    conn: &mut PgConnection,
    submission_id: &str,
    source_code: &str,
    code_hash: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET source_code = $1,
             code_hash = $2,
             status = $3,
             dispatch_attempts = 0,
             dispatch_started_at = NULL,
             next_dispatch_at = $4
         WHERE id = $5",
    )
    .bind(source_code)
    .bind(code_hash)
    .bind(JudgeStatus::Pending)
    .bind(now)
    .bind(submission_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Claim the next submission due for dispatch. The claim itself counts as an
/// attempt; a claimed row is invisible to other workers until the attempt is
/// settled (`rearm_dispatch` or a terminal update).
pub(crate) async fn claim_next_for_dispatch(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id FROM submissions
            WHERE status = $1
              AND dispatch_started_at IS NULL
              AND (next_dispatch_at IS NULL OR next_dispatch_at <= $2)
            ORDER BY dispatch_attempts, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE submissions
        SET dispatch_started_at = $2,
            dispatch_attempts = dispatch_attempts + 1
        FROM candidate
        WHERE submissions.id = candidate.id
        RETURNING submissions.id",
    )
    .bind(JudgeStatus::Pending)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Put a submission back on the queue after a transport failure. No-ops when
/// a concurrent callback already moved the row out of `pending`.
pub(crate) async fn rearm_dispatch(
    pool: &PgPool,
    submission_id: &str,
    next_dispatch_at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET dispatch_started_at = NULL,
             next_dispatch_at = $1
         WHERE id = $2 AND status = $3",
    )
    .bind(next_dispatch_at)
    .bind(submission_id)
    .bind(JudgeStatus::Pending)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Terminal failure path: the runner gave up, the submission must not stay
/// `pending`.
pub(crate) async fn mark_judge_error(
    pool: &PgPool,
    submission_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             score = 0,
             execution_time_ms = -1,
             memory_kb = -1,
             judged_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(JudgeStatus::JudgeError)
    .bind(now)
    .bind(submission_id)
    .bind(JudgeStatus::Pending)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Reset a judged submission back to `pending` for rejudging. The caller
/// holds the row lock and deletes the old per-case results in the same
/// transaction.
pub(crate) async fn rejudge_reset(
    conn: &mut PgConnection,
    submission_id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET status = $1,
             score = 0,
             execution_time_ms = -1,
             memory_kb = -1,
             judged_at = NULL,
             dispatch_attempts = 0,
             dispatch_started_at = NULL,
             next_dispatch_at = $2
         WHERE id = $3",
    )
    .bind(JudgeStatus::Pending)
    .bind(now)
    .bind(submission_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn apply_judge_result(
    conn: &mut PgConnection,
    submission_id: &str,
    params: JudgedUpdate<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET status = $1,
             score = $2,
             execution_time_ms = $3,
             memory_kb = $4,
             judge_server = COALESCE($5, judge_server),
             judged_at = $6
         WHERE id = $7",
    )
    .bind(params.status)
    .bind(params.score)
    .bind(params.execution_time_ms)
    .bind(params.memory_kb)
    .bind(params.judge_server)
    .bind(params.judged_at)
    .bind(submission_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Re-arm submissions whose dispatch attempt started before `cutoff` but
/// never settled (crashed worker, sandbox that never acked). Returns the
/// re-armed ids.
pub(crate) async fn recover_stale_dispatches(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE submissions
         SET dispatch_started_at = NULL,
             next_dispatch_at = $1
         WHERE status = $2
           AND dispatch_started_at IS NOT NULL
           AND dispatch_started_at < $3
         RETURNING id",
    )
    .bind(now)
    .bind(JudgeStatus::Pending)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}
