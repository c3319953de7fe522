use sqlx::PgConnection;
use time::PrimitiveDateTime;

use crate::db::types::{JudgeStatus, SolveStatus};
use crate::repositories::solve_stats;

/// The values the statistics aggregate consumes from a freshly judged
/// submission. Taken explicitly rather than from the (stale) row model so the
/// caller can pass the post-ingestion state.
pub(crate) struct JudgedSubmission<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) problem_id: i64,
    pub(crate) status: JudgeStatus,
    pub(crate) score: i32,
    pub(crate) execution_time_ms: i32,
    pub(crate) memory_kb: i64,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) judged_at: PrimitiveDateTime,
}

/// Fold one judged submission into the (user, problem) aggregate.
///
/// The counter columns go through SQL-level increments and are never lost
/// under concurrent ingestion. The best-value pass below them is
/// read-then-write: two callbacks racing on the same pair may lose one
/// best-score comparison, which the aggregate tolerates (it is a cache, not
/// a ledger).
pub(crate) async fn apply_judged_submission(
    conn: &mut PgConnection,
    judged: &JudgedSubmission<'_>,
) -> Result<(), sqlx::Error> {
    solve_stats::ensure_row(conn, judged.user_id, judged.problem_id, judged.judged_at).await?;

    let row = solve_stats::increment_counters(
        conn,
        solve_stats::CounterIncrement {
            user_id: judged.user_id,
            problem_id: judged.problem_id,
            accepted: judged.status == JudgeStatus::Accepted,
            execution_time_ms: judged.execution_time_ms,
            submitted_at: judged.submitted_at,
            judged_at: judged.judged_at,
        },
    )
    .await?;

    let best_score = row.best_score.max(judged.score);

    let best_time_ms = if judged.execution_time_ms > 0 {
        Some(match row.best_time_ms {
            Some(existing) => existing.min(judged.execution_time_ms),
            None => judged.execution_time_ms,
        })
    } else {
        row.best_time_ms
    };

    let best_memory_kb = if judged.memory_kb > 0 {
        Some(match row.best_memory_kb {
            Some(existing) => existing.min(judged.memory_kb),
            None => judged.memory_kb,
        })
    } else {
        row.best_memory_kb
    };

    let solve_status = recompute_solve_status(best_score, row.total_submissions);

    solve_stats::persist_bests(
        conn,
        judged.user_id,
        judged.problem_id,
        solve_stats::BestValues { best_score, best_time_ms, best_memory_kb, solve_status },
        judged.judged_at,
    )
    .await
}

pub(crate) fn recompute_solve_status(best_score: i32, total_submissions: i32) -> SolveStatus {
    if best_score >= 100 {
        SolveStatus::FullySolved
    } else if best_score > 0 {
        SolveStatus::PartialSolved
    } else if total_submissions == 0 {
        SolveStatus::NeverTried
    } else {
        SolveStatus::Attempted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_status_thresholds() {
        assert_eq!(recompute_solve_status(100, 1), SolveStatus::FullySolved);
        assert_eq!(recompute_solve_status(120, 1), SolveStatus::FullySolved);
        assert_eq!(recompute_solve_status(40, 3), SolveStatus::PartialSolved);
        assert_eq!(recompute_solve_status(0, 2), SolveStatus::Attempted);
        assert_eq!(recompute_solve_status(0, 0), SolveStatus::NeverTried);
    }
}
