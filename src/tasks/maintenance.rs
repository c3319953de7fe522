use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Re-arm dispatches whose in-flight lease expired: the worker crashed
/// between claim and settle, or the sandbox never answered within the
/// client timeout window. The claim counter still holds the spent attempt,
/// so the retry cap keeps its meaning.
pub(crate) async fn recover_stale_dispatches(state: &AppState) -> Result<()> {
    let lease = Duration::seconds(state.settings().sandbox().dispatch_lease_seconds as i64);
    let now = primitive_now_utc();
    let cutoff = now - lease;

    let submissions = repositories::submissions::recover_stale_dispatches(state.db(), cutoff, now)
        .await
        .context("Failed to recover stale submission dispatches")?;

    let custom_tests =
        repositories::custom_tests::recover_stale_dispatches(state.db(), cutoff, now)
            .await
            .context("Failed to recover stale custom test dispatches")?;

    if !submissions.is_empty() || !custom_tests.is_empty() {
        tracing::warn!(
            submissions = submissions.len(),
            custom_tests = custom_tests.len(),
            "Re-armed stale dispatches"
        );
        metrics::counter!("stale_dispatches_recovered_total")
            .increment((submissions.len() + custom_tests.len()) as u64);
    }

    Ok(())
}

/// Fail plagiarism checks whose worker task never finished. Keeps the
/// single-flight gate from wedging after a crash.
pub(crate) async fn fail_stale_plagiarism_checks(state: &AppState) -> Result<()> {
    let stale_after =
        Duration::seconds(state.settings().judging().plagiarism_stale_after_seconds as i64);
    let now = primitive_now_utc();

    let failed = repositories::plagiarism::fail_stale_pending(state.db(), now - stale_after, now)
        .await
        .context("Failed to fail stale plagiarism checks")?;

    if !failed.is_empty() {
        tracing::warn!(reports = failed.len(), "Failed stale plagiarism checks");
        metrics::counter!("plagiarism_checks_total", "status" => "stale")
            .increment(failed.len() as u64);
    }

    Ok(())
}
