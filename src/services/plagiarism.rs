use thiserror::Error;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::PlagiarismReport;
use crate::db::types::{Language, PlagiarismStatus};
use crate::repositories;
use crate::services::sandbox::SimilarityCheck;

#[derive(Debug, Error)]
pub(crate) enum TriggerError {
    /// A check for this problem is already in flight; no new row is created.
    #[error("a plagiarism check for this problem is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Single-flight trigger: at most one `pending` check per problem. On success
/// a detached worker task finalizes the report; the caller returns
/// immediately with the new row.
pub(crate) async fn trigger_check(
    state: &AppState,
    problem_id: i64,
    requested_by: &str,
    language: Language,
) -> Result<PlagiarismReport, TriggerError> {
    let latest = repositories::plagiarism::latest_for_problem(state.db(), problem_id).await?;
    if latest.map(|report| report.status) == Some(PlagiarismStatus::Pending) {
        return Err(TriggerError::AlreadyRunning);
    }

    let report = repositories::plagiarism::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        problem_id,
        requested_by,
        language,
        primitive_now_utc(),
    )
    .await?;

    spawn_check_worker(state.clone(), report.id.clone(), problem_id, language);

    Ok(report)
}

fn spawn_check_worker(state: AppState, report_id: String, problem_id: i64, language: Language) {
    tokio::spawn(async move {
        let client = state.sandbox().clone();
        run_check(&state, &client, &report_id, problem_id, language).await;
    });
}

pub(crate) async fn run_check(
    state: &AppState,
    client: &dyn SimilarityCheck,
    report_id: &str,
    problem_id: i64,
    language: Language,
) {
    match client.run_similarity_check(problem_id, language).await {
        Ok(report_url) => {
            if let Err(err) = repositories::plagiarism::mark_success(
                state.db(),
                report_id,
                &report_url,
                primitive_now_utc(),
            )
            .await
            {
                tracing::error!(report_id, error = %err, "Failed to finalize plagiarism report");
                return;
            }
            metrics::counter!("plagiarism_checks_total", "status" => "success").increment(1);
            tracing::info!(report_id, problem_id, "Plagiarism check finished");
        }
        Err(err) => {
            if let Err(db_err) = repositories::plagiarism::mark_failed(
                state.db(),
                report_id,
                &err.to_string(),
                primitive_now_utc(),
            )
            .await
            {
                tracing::error!(report_id, error = %db_err, "Failed to fail plagiarism report");
                return;
            }
            metrics::counter!("plagiarism_checks_total", "status" => "failed").increment(1);
            tracing::warn!(report_id, problem_id, error = %err, "Plagiarism check failed");
        }
    }
}
