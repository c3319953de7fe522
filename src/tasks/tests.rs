use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use time::Duration;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::{CustomRunStatus, JudgeStatus, Language};
use crate::repositories;
use crate::services::sandbox::{
    CustomTestDispatch, DispatchError, SandboxDispatch, SolutionDispatch,
};
use crate::tasks::dispatch;
use crate::test_support;

struct FailingDispatch;

#[async_trait]
impl SandboxDispatch for FailingDispatch {
    async fn submit_solution(
        &self,
        _request: SolutionDispatch<'_>,
    ) -> Result<Value, DispatchError> {
        Err(DispatchError::Transport("connection refused".to_string()))
    }

    async fn submit_custom_test(
        &self,
        _request: CustomTestDispatch<'_>,
    ) -> Result<Value, DispatchError> {
        Err(DispatchError::Transport("connection refused".to_string()))
    }
}

#[derive(Default)]
struct RecordingDispatch {
    calls: AtomicUsize,
}

#[async_trait]
impl SandboxDispatch for RecordingDispatch {
    async fn submit_solution(
        &self,
        _request: SolutionDispatch<'_>,
    ) -> Result<Value, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"detail": "queued"}))
    }

    async fn submit_custom_test(
        &self,
        _request: CustomTestDispatch<'_>,
    ) -> Result<Value, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"detail": "queued"}))
    }
}

async fn insert_pending_submission(ctx: &test_support::TestContext, problem_id: i64) -> Submission {
    let user =
        test_support::insert_user(ctx.state.db(), &format!("runner-{}", Uuid::new_v4()), "Runner", "pass")
            .await;
    let now = primitive_now_utc();

    let submission = repositories::submissions::create(
        ctx.state.db(),
        repositories::submissions::CreateSubmission {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            problem_id,
            language: Language::Python,
            ip_address: None,
            user_agent: None,
            is_late: false,
            attempt_number: 1,
            created_at: now,
        },
    )
    .await
    .expect("create submission");

    let mut tx = ctx.state.db().begin().await.expect("begin");
    repositories::submissions::attach_code(&mut *tx, &submission.id, "print(1)", "hash-1", now)
        .await
        .expect("attach code");
    tx.commit().await.expect("commit");

    repositories::submissions::find_by_id(ctx.state.db(), &submission.id)
        .await
        .expect("reload")
        .expect("exists")
}

async fn make_due(ctx: &test_support::TestContext, table: &str, id: &str) {
    let past = primitive_now_utc() - Duration::seconds(10);
    sqlx::query(&format!("UPDATE {table} SET next_dispatch_at = $1 WHERE id = $2"))
        .bind(past)
        .bind(id)
        .execute(ctx.state.db())
        .await
        .expect("make due");
}

#[tokio::test]
async fn exhausted_retries_force_judge_error() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::insert_user(ctx.state.db(), "runner-teacher1", "Teacher", "pass").await;
    let course =
        test_support::create_course_with_teacher(ctx.state.db(), "run-301", "Runtime", &teacher.id)
            .await;
    let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Echo").await;

    let submission = insert_pending_submission(&ctx, problem.id).await;

    // Initial attempt plus three retries, every one failing at transport
    // level.
    for round in 1..=4 {
        make_due(&ctx, "submissions", &submission.id).await;
        let claimed =
            dispatch::claim_next_submission(ctx.state.db()).await.expect("claim");
        assert_eq!(claimed.as_deref(), Some(submission.id.as_str()), "round {round}");

        dispatch::dispatch_submission(&ctx.state, &FailingDispatch, &submission.id)
            .await
            .expect("dispatch");

        let stored = repositories::submissions::find_by_id(ctx.state.db(), &submission.id)
            .await
            .expect("load")
            .expect("exists");

        if round < 4 {
            assert_eq!(stored.status, JudgeStatus::Pending, "round {round}");
            assert!(stored.dispatch_started_at.is_none());
            let next = stored.next_dispatch_at.expect("backoff armed");
            assert!(next > primitive_now_utc(), "round {round} should back off");
        } else {
            assert_eq!(stored.status, JudgeStatus::JudgeError);
            assert!(stored.judged_at.is_some());
            assert_eq!(stored.score, 0);
            assert_eq!(stored.execution_time_ms, -1);
            assert_eq!(stored.memory_kb, -1);
        }
    }

    // Nothing is left to claim; the submission is not stuck in pending.
    let claimed = dispatch::claim_next_submission(ctx.state.db()).await.expect("claim");
    assert_eq!(claimed, None);
}

#[tokio::test]
async fn missing_problem_is_not_retried() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::insert_user(ctx.state.db(), "runner-teacher2", "Teacher", "pass").await;
    let course =
        test_support::create_course_with_teacher(ctx.state.db(), "run-302", "Runtime", &teacher.id)
            .await;
    let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Ghost").await;

    let submission = insert_pending_submission(&ctx, problem.id).await;

    // The problem reference is deliberately loose; drop the row to simulate
    // a dangling submission.
    sqlx::query("DELETE FROM problems WHERE id = $1")
        .bind(problem.id)
        .execute(ctx.state.db())
        .await
        .expect("delete problem");

    make_due(&ctx, "submissions", &submission.id).await;
    let claimed = dispatch::claim_next_submission(ctx.state.db()).await.expect("claim");
    assert_eq!(claimed.as_deref(), Some(submission.id.as_str()));

    dispatch::dispatch_submission(&ctx.state, &FailingDispatch, &submission.id)
        .await
        .expect("dispatch");

    let stored = repositories::submissions::find_by_id(ctx.state.db(), &submission.id)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(stored.status, JudgeStatus::JudgeError);
    assert_eq!(stored.dispatch_attempts, 1);
}

#[tokio::test]
async fn successful_dispatch_holds_the_claim() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::insert_user(ctx.state.db(), "runner-teacher3", "Teacher", "pass").await;
    let course =
        test_support::create_course_with_teacher(ctx.state.db(), "run-303", "Runtime", &teacher.id)
            .await;
    let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Sum").await;

    let submission = insert_pending_submission(&ctx, problem.id).await;
    let client = RecordingDispatch::default();

    make_due(&ctx, "submissions", &submission.id).await;
    let claimed = dispatch::claim_next_submission(ctx.state.db()).await.expect("claim");
    assert_eq!(claimed.as_deref(), Some(submission.id.as_str()));

    dispatch::dispatch_submission(&ctx.state, &client, &submission.id)
        .await
        .expect("dispatch");
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);

    // Still pending (the callback finishes it), but held in flight so no
    // second worker can double-dispatch.
    let stored = repositories::submissions::find_by_id(ctx.state.db(), &submission.id)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(stored.status, JudgeStatus::Pending);
    assert!(stored.dispatch_started_at.is_some());

    let claimed = dispatch::claim_next_submission(ctx.state.db()).await.expect("claim");
    assert_eq!(claimed, None);
}

#[tokio::test]
async fn dispatch_skips_rows_that_left_pending() {
    let ctx = test_support::setup_test_context().await;
    let teacher =
        test_support::insert_user(ctx.state.db(), "runner-teacher4", "Teacher", "pass").await;
    let course =
        test_support::create_course_with_teacher(ctx.state.db(), "run-304", "Runtime", &teacher.id)
            .await;
    let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Race").await;

    let submission = insert_pending_submission(&ctx, problem.id).await;

    make_due(&ctx, "submissions", &submission.id).await;
    let claimed = dispatch::claim_next_submission(ctx.state.db()).await.expect("claim");
    assert_eq!(claimed.as_deref(), Some(submission.id.as_str()));

    // A callback lands between claim and dispatch.
    sqlx::query("UPDATE submissions SET status = $1, judged_at = $2 WHERE id = $3")
        .bind(JudgeStatus::Accepted)
        .bind(primitive_now_utc())
        .bind(&submission.id)
        .execute(ctx.state.db())
        .await
        .expect("simulate callback");

    let client = RecordingDispatch::default();
    dispatch::dispatch_submission(&ctx.state, &client, &submission.id)
        .await
        .expect("dispatch");

    // The job no-oped; nothing went to the sandbox.
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_test_retries_then_fails() {
    let ctx = test_support::setup_test_context().await;
    let user = test_support::insert_user(ctx.state.db(), "runner-student5", "Student", "pass").await;

    let custom_test = repositories::custom_tests::create(
        ctx.state.db(),
        repositories::custom_tests::CreateCustomTest {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            problem_id: None,
            language: Language::Python,
            source_code: "print(input())",
            stdin: "7",
            created_at: primitive_now_utc(),
        },
    )
    .await
    .expect("create custom test");

    for _ in 1..=4 {
        make_due(&ctx, "custom_tests", &custom_test.id).await;
        let claimed =
            dispatch::claim_next_custom_test(ctx.state.db()).await.expect("claim");
        assert_eq!(claimed.as_deref(), Some(custom_test.id.as_str()));

        dispatch::dispatch_custom_test(&ctx.state, &FailingDispatch, &custom_test.id)
            .await
            .expect("dispatch");
    }

    let stored = repositories::custom_tests::find_by_id(ctx.state.db(), &custom_test.id)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(stored.status, CustomRunStatus::Failed);
    assert!(stored.error.is_some());
    assert!(stored.finished_at.is_some());
}
