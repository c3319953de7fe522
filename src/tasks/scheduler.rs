use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::services::sandbox::{SandboxClient, SandboxDispatch};
use crate::tasks::{dispatch, maintenance};

const IDLE_POLL_SECONDS: u64 = 2;
const MAINTENANCE_INTERVAL_SECONDS: u64 = 60;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let sandbox = SandboxClient::from_settings(state.settings())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let judging = state.settings().judging();
    let mut handles =
        Vec::with_capacity(judging.dispatch_workers + judging.custom_test_workers + 1);

    for _ in 0..judging.dispatch_workers {
        handles.push(tokio::spawn(submission_worker(
            state.clone(),
            sandbox.clone(),
            shutdown_rx.clone(),
        )));
    }
    for _ in 0..judging.custom_test_workers {
        handles.push(tokio::spawn(custom_test_worker(
            state.clone(),
            sandbox.clone(),
            shutdown_rx.clone(),
        )));
    }

    handles.push(tokio::spawn(maintenance_loop(state.clone(), shutdown_rx.clone())));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn submission_worker(
    state: AppState,
    sandbox: SandboxClient,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match dispatch::claim_next_submission(state.db()).await {
            Ok(Some(submission_id)) => {
                let client: &dyn SandboxDispatch = &sandbox;
                if let Err(err) =
                    dispatch::dispatch_submission(&state, client, &submission_id).await
                {
                    tracing::error!(
                        submission_id,
                        error = %err,
                        "Failed to dispatch submission"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim submission"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_secs(IDLE_POLL_SECONDS)) => {}
        }
    }
}

async fn custom_test_worker(
    state: AppState,
    sandbox: SandboxClient,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match dispatch::claim_next_custom_test(state.db()).await {
            Ok(Some(custom_test_id)) => {
                let client: &dyn SandboxDispatch = &sandbox;
                if let Err(err) =
                    dispatch::dispatch_custom_test(&state, client, &custom_test_id).await
                {
                    tracing::error!(
                        custom_test_id,
                        error = %err,
                        "Failed to dispatch custom test"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim custom test"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_secs(IDLE_POLL_SECONDS)) => {}
        }
    }
}

async fn maintenance_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECONDS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::recover_stale_dispatches(&state).await {
                    tracing::error!(error = %err, "recover_stale_dispatches failed");
                }
                if let Err(err) = maintenance::fail_stale_plagiarism_checks(&state).await {
                    tracing::error!(error = %err, "fail_stale_plagiarism_checks failed");
                }
            }
        }
    }
}
