use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{require_course_staff_for_problem, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::Language;
use crate::repositories;
use crate::schemas::plagiarism::{
    to_report_response, PlagiarismReportResponse, TriggerPlagiarismRequest,
};
use crate::services::plagiarism::{self, TriggerError};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/problems/:problem_id/plagiarism-checks", post(trigger_check))
        .route("/problems/:problem_id/plagiarism-checks/latest", get(latest_check))
}

/// POST /problems/:id/plagiarism-checks. 202 with the new job, or 429 while
/// a check for this problem is still pending (single-flight; no row is
/// created in that case).
async fn trigger_check(
    Path(problem_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<TriggerPlagiarismRequest>,
) -> Result<(StatusCode, Json<PlagiarismReportResponse>), ApiError> {
    require_course_staff_for_problem(&state, &user, problem_id).await?;

    let Some(language) = Language::parse(&payload.language) else {
        return Err(ApiError::BadRequest(format!(
            "Unsupported language {:?}; expected one of {}",
            payload.language,
            Language::supported_names().join(", ")
        )));
    };

    let report = plagiarism::trigger_check(&state, problem_id, &user.id, language)
        .await
        .map_err(|err| match err {
            TriggerError::AlreadyRunning => {
                ApiError::TooManyRequests("A plagiarism check for this problem is already in progress")
            }
            TriggerError::Db(db_err) => {
                ApiError::internal(db_err, "Failed to trigger plagiarism check")
            }
        })?;

    tracing::info!(
        report_id = %report.id,
        problem_id,
        requested_by = %user.id,
        "Plagiarism check started"
    );

    Ok((StatusCode::ACCEPTED, Json(to_report_response(report))))
}

/// GET /problems/:id/plagiarism-checks/latest. The most recent job for the
/// problem, whatever its state.
async fn latest_check(
    Path(problem_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PlagiarismReportResponse>, ApiError> {
    require_course_staff_for_problem(&state, &user, problem_id).await?;

    let report = repositories::plagiarism::latest_for_problem(state.db(), problem_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load plagiarism report"))?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No plagiarism checks for problem {problem_id}"))
        })?;

    Ok(Json(to_report_response(report)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::core::time::primitive_now_utc;
    use crate::db::types::{Language, PlagiarismStatus};
    use crate::repositories;
    use crate::test_support;

    #[tokio::test]
    async fn trigger_is_staff_only_and_validates_input() {
        let ctx = test_support::setup_test_context().await;

        let teacher =
            test_support::insert_user(ctx.state.db(), "teacher20", "Teacher", "teacher-pass")
                .await;
        let course = test_support::create_course_with_teacher(
            ctx.state.db(),
            "plag-401",
            "Plagiarism",
            &teacher.id,
        )
        .await;
        let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Strings").await;

        let student =
            test_support::insert_user(ctx.state.db(), "student20", "Student", "student-pass")
                .await;
        let student_token = test_support::bearer_token(&student.id, ctx.state.settings());
        let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/problems/{}/plagiarism-checks", problem.id),
                Some(&student_token),
                Some(json!({"language": "python"})),
            ))
            .await
            .expect("student trigger");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/problems/999999/plagiarism-checks",
                Some(&teacher_token),
                Some(json!({"language": "python"})),
            ))
            .await
            .expect("unknown problem");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/problems/{}/plagiarism-checks", problem.id),
                Some(&teacher_token),
                Some(json!({"language": "brainfuck"})),
            ))
            .await
            .expect("bad language");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_trigger_while_pending_is_rejected_without_a_row() {
        let ctx = test_support::setup_test_context().await;

        let teacher =
            test_support::insert_user(ctx.state.db(), "teacher21", "Teacher", "teacher-pass")
                .await;
        let course = test_support::create_course_with_teacher(
            ctx.state.db(),
            "plag-402",
            "Plagiarism",
            &teacher.id,
        )
        .await;
        let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Trees").await;
        let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        // An in-flight check, created directly so no worker can finish it
        // under the test.
        repositories::plagiarism::create(
            ctx.state.db(),
            &Uuid::new_v4().to_string(),
            problem.id,
            &teacher.id,
            Language::Python,
            primitive_now_utc(),
        )
        .await
        .expect("insert pending report");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/problems/{}/plagiarism-checks", problem.id),
                Some(&teacher_token),
                Some(json!({"language": "python"})),
            ))
            .await
            .expect("second trigger");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let pending =
            repositories::plagiarism::count_pending_for_problem(ctx.state.db(), problem.id)
                .await
                .expect("count pending");
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn latest_returns_the_most_recent_report() {
        let ctx = test_support::setup_test_context().await;

        let teacher =
            test_support::insert_user(ctx.state.db(), "teacher22", "Teacher", "teacher-pass")
                .await;
        let course = test_support::create_course_with_teacher(
            ctx.state.db(),
            "plag-403",
            "Plagiarism",
            &teacher.id,
        )
        .await;
        let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Heaps").await;
        let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/problems/{}/plagiarism-checks/latest", problem.id),
                Some(&teacher_token),
                None,
            ))
            .await
            .expect("latest before any");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let earlier = repositories::plagiarism::create(
            ctx.state.db(),
            &Uuid::new_v4().to_string(),
            problem.id,
            &teacher.id,
            Language::Python,
            primitive_now_utc() - time::Duration::seconds(60),
        )
        .await
        .expect("insert earlier report");
        repositories::plagiarism::mark_failed(
            ctx.state.db(),
            &earlier.id,
            "similarity backend unreachable",
            primitive_now_utc(),
        )
        .await
        .expect("fail earlier report");

        let latest = repositories::plagiarism::create(
            ctx.state.db(),
            &Uuid::new_v4().to_string(),
            problem.id,
            &teacher.id,
            Language::Cpp,
            primitive_now_utc(),
        )
        .await
        .expect("insert latest report");
        repositories::plagiarism::mark_success(
            ctx.state.db(),
            &latest.id,
            "https://reports.example/42",
            primitive_now_utc(),
        )
        .await
        .expect("finish latest report");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/problems/{}/plagiarism-checks/latest", problem.id),
                Some(&teacher_token),
                None,
            ))
            .await
            .expect("latest");

        let status = response.status();
        let body = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {body}");
        assert_eq!(body["id"], latest.id.as_str());
        assert_eq!(body["status"], "success");
        assert_eq!(body["report_url"], "https://reports.example/42");
    }

    #[tokio::test]
    async fn stale_pending_reports_are_failed_by_maintenance() {
        let ctx = test_support::setup_test_context().await;

        let teacher =
            test_support::insert_user(ctx.state.db(), "teacher23", "Teacher", "teacher-pass")
                .await;
        let course = test_support::create_course_with_teacher(
            ctx.state.db(),
            "plag-404",
            "Plagiarism",
            &teacher.id,
        )
        .await;
        let problem = test_support::insert_problem(ctx.state.db(), &course.id, "Stale").await;

        let stale = repositories::plagiarism::create(
            ctx.state.db(),
            &Uuid::new_v4().to_string(),
            problem.id,
            &teacher.id,
            Language::Java,
            primitive_now_utc() - time::Duration::seconds(7200),
        )
        .await
        .expect("insert stale report");

        crate::tasks::maintenance::fail_stale_plagiarism_checks(&ctx.state)
            .await
            .expect("maintenance");

        let report = repositories::plagiarism::latest_for_problem(ctx.state.db(), problem.id)
            .await
            .expect("latest")
            .expect("report exists");
        assert_eq!(report.id, stale.id);
        assert_eq!(report.status, PlagiarismStatus::Failed);
        assert!(report.error.is_some());
    }
}
