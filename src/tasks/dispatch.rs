use anyhow::{Context, Result};
use sqlx::PgPool;
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{CustomTest, Submission};
use crate::db::types::{CustomRunStatus, JudgeStatus};
use crate::repositories;
use crate::services::sandbox::{
    CustomTestDispatch, DispatchError, SandboxDispatch, SolutionDispatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Backoff schedule for a dispatch that has failed `attempts_made` times
/// (the initial attempt counts). With the defaults this yields 60 s, 120 s,
/// 240 s for submissions and 30 s, 60 s, 120 s for custom tests, then gives
/// up.
pub(crate) fn next_retry(
    base_seconds: u64,
    max_retries: u32,
    attempts_made: u32,
) -> RetryDecision {
    if attempts_made > max_retries {
        return RetryDecision::GiveUp;
    }

    let exponent = attempts_made.saturating_sub(1).min(16);
    let delay = base_seconds.saturating_mul(1 << exponent);
    RetryDecision::Retry(Duration::seconds(delay as i64))
}

pub(crate) async fn claim_next_submission(pool: &PgPool) -> Result<Option<String>> {
    repositories::submissions::claim_next_for_dispatch(pool, primitive_now_utc())
        .await
        .context("Failed to claim submission for dispatch")
}

pub(crate) async fn claim_next_custom_test(pool: &PgPool) -> Result<Option<String>> {
    repositories::custom_tests::claim_next_for_dispatch(pool, primitive_now_utc())
        .await
        .context("Failed to claim custom test for dispatch")
}

/// One dispatch attempt for a claimed submission. Re-delivery safe: the job
/// no-ops when the row is no longer `pending` (a callback or a concurrent
/// settle won the race).
pub(crate) async fn dispatch_submission(
    state: &AppState,
    client: &dyn SandboxDispatch,
    submission_id: &str,
) -> Result<()> {
    let submission = repositories::submissions::find_by_id(state.db(), submission_id)
        .await
        .context("Failed to load claimed submission")?;

    let Some(submission) = submission else {
        tracing::warn!(submission_id, "Claimed submission vanished; skipping");
        return Ok(());
    };

    if submission.status != JudgeStatus::Pending {
        tracing::info!(submission_id, status = ?submission.status, "Skipping dispatch");
        return Ok(());
    }

    let problem = repositories::problems::find_by_id(state.db(), submission.problem_id)
        .await
        .context("Failed to resolve problem for dispatch")?;

    let Some(problem) = problem else {
        // Non-retryable: the problem no longer resolves.
        let err = DispatchError::Rejected(format!(
            "problem {} does not resolve",
            submission.problem_id
        ));
        return settle_submission_failure(state, &submission, err).await;
    };

    let judging = state.settings().judging();
    let request = SolutionDispatch {
        submission_id: &submission.id,
        problem_id: problem.id,
        problem_hash: &problem.content_hash,
        language: submission.language,
        source_code: &submission.source_code,
        time_limit_ms: problem
            .time_limit_ms
            .map(|value| value as u32)
            .unwrap_or(judging.default_time_limit_ms),
        memory_limit_mb: problem
            .memory_limit_mb
            .map(|value| value as u32)
            .unwrap_or(judging.default_memory_limit_mb),
        use_checker: problem.use_checker,
        checker_name: problem.checker_name.as_deref(),
        use_static_analysis: problem.use_static_analysis,
        priority: 0,
    };

    match client.submit_solution(request).await {
        Ok(ack) => {
            metrics::counter!("submissions_dispatched_total", "status" => "ok").increment(1);
            tracing::info!(submission_id, attempt = submission.dispatch_attempts, "Dispatched submission");
            tracing::debug!(submission_id, ack = %ack, "Sandbox acknowledgement");
            Ok(())
        }
        Err(err) => settle_submission_failure(state, &submission, err).await,
    }
}

async fn settle_submission_failure(
    state: &AppState,
    submission: &Submission,
    err: DispatchError,
) -> Result<()> {
    let sandbox = state.settings().sandbox();
    let decision = if err.is_retryable() {
        next_retry(
            sandbox.submission_retry_seconds,
            sandbox.max_dispatch_retries,
            submission.dispatch_attempts as u32,
        )
    } else {
        RetryDecision::GiveUp
    };

    match decision {
        RetryDecision::Retry(delay) => {
            let rearmed = repositories::submissions::rearm_dispatch(
                state.db(),
                &submission.id,
                primitive_now_utc() + delay,
            )
            .await
            .context("Failed to re-arm submission dispatch")?;

            if rearmed {
                metrics::counter!("submissions_dispatched_total", "status" => "retry")
                    .increment(1);
                tracing::warn!(
                    submission_id = %submission.id,
                    attempt = submission.dispatch_attempts,
                    retry_in_seconds = delay.whole_seconds(),
                    error = %err,
                    "Dispatch failed; scheduled retry"
                );
            } else {
                tracing::info!(
                    submission_id = %submission.id,
                    "Submission left pending state during retry settlement; skipping"
                );
            }
        }
        RetryDecision::GiveUp => {
            let marked = repositories::submissions::mark_judge_error(
                state.db(),
                &submission.id,
                primitive_now_utc(),
            )
            .await
            .context("Failed to mark submission as judge error")?;

            if marked {
                metrics::counter!("submissions_dispatched_total", "status" => "judge_error")
                    .increment(1);
                tracing::error!(
                    submission_id = %submission.id,
                    attempts = submission.dispatch_attempts,
                    error = %err,
                    "Dispatch gave up; submission marked judge_error"
                );
            }
        }
    }

    Ok(())
}

pub(crate) async fn dispatch_custom_test(
    state: &AppState,
    client: &dyn SandboxDispatch,
    custom_test_id: &str,
) -> Result<()> {
    let custom_test = repositories::custom_tests::find_by_id(state.db(), custom_test_id)
        .await
        .context("Failed to load claimed custom test")?;

    let Some(custom_test) = custom_test else {
        tracing::warn!(custom_test_id, "Claimed custom test vanished; skipping");
        return Ok(());
    };

    if custom_test.status != CustomRunStatus::Pending {
        tracing::info!(custom_test_id, status = ?custom_test.status, "Skipping dispatch");
        return Ok(());
    }

    let judging = state.settings().judging();
    let request = CustomTestDispatch {
        custom_test_id: &custom_test.id,
        language: custom_test.language,
        source_code: &custom_test.source_code,
        stdin: &custom_test.stdin,
        time_limit_ms: judging.default_time_limit_ms,
        memory_limit_mb: judging.default_memory_limit_mb,
        priority: 1,
    };

    match client.submit_custom_test(request).await {
        Ok(ack) => {
            metrics::counter!("custom_tests_dispatched_total", "status" => "ok").increment(1);
            tracing::debug!(custom_test_id, ack = %ack, "Sandbox acknowledgement");
            Ok(())
        }
        Err(err) => settle_custom_test_failure(state, &custom_test, err).await,
    }
}

async fn settle_custom_test_failure(
    state: &AppState,
    custom_test: &CustomTest,
    err: DispatchError,
) -> Result<()> {
    let sandbox = state.settings().sandbox();
    let decision = if err.is_retryable() {
        next_retry(
            sandbox.custom_test_retry_seconds,
            sandbox.max_dispatch_retries,
            custom_test.dispatch_attempts as u32,
        )
    } else {
        RetryDecision::GiveUp
    };

    match decision {
        RetryDecision::Retry(delay) => {
            let rearmed = repositories::custom_tests::rearm_dispatch(
                state.db(),
                &custom_test.id,
                primitive_now_utc() + delay,
            )
            .await
            .context("Failed to re-arm custom test dispatch")?;

            if rearmed {
                metrics::counter!("custom_tests_dispatched_total", "status" => "retry")
                    .increment(1);
                tracing::warn!(
                    custom_test_id = %custom_test.id,
                    attempt = custom_test.dispatch_attempts,
                    retry_in_seconds = delay.whole_seconds(),
                    error = %err,
                    "Custom test dispatch failed; scheduled retry"
                );
            }
        }
        RetryDecision::GiveUp => {
            let marked = repositories::custom_tests::mark_failed(
                state.db(),
                &custom_test.id,
                &err.to_string(),
                primitive_now_utc(),
            )
            .await
            .context("Failed to mark custom test as failed")?;

            if marked {
                metrics::counter!("custom_tests_dispatched_total", "status" => "failed")
                    .increment(1);
                tracing::error!(
                    custom_test_id = %custom_test.id,
                    attempts = custom_test.dispatch_attempts,
                    error = %err,
                    "Custom test dispatch gave up"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_backoff_curve() {
        assert_eq!(next_retry(60, 3, 1), RetryDecision::Retry(Duration::seconds(60)));
        assert_eq!(next_retry(60, 3, 2), RetryDecision::Retry(Duration::seconds(120)));
        assert_eq!(next_retry(60, 3, 3), RetryDecision::Retry(Duration::seconds(240)));
        assert_eq!(next_retry(60, 3, 4), RetryDecision::GiveUp);
    }

    #[test]
    fn custom_test_backoff_curve() {
        assert_eq!(next_retry(30, 3, 1), RetryDecision::Retry(Duration::seconds(30)));
        assert_eq!(next_retry(30, 3, 2), RetryDecision::Retry(Duration::seconds(60)));
        assert_eq!(next_retry(30, 3, 3), RetryDecision::Retry(Duration::seconds(120)));
        assert_eq!(next_retry(30, 3, 4), RetryDecision::GiveUp);
    }

    #[test]
    fn backoff_shift_is_bounded() {
        // A corrupted attempt counter must not panic the worker.
        assert_eq!(next_retry(60, 100, 40), RetryDecision::Retry(Duration::seconds(60 << 16)));
    }
}
