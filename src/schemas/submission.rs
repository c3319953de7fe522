use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Submission, SubmissionResult, UserProblemStatus};
use crate::db::types::{JudgeStatus, Language, SolveStatus};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSubmissionRequest {
    pub(crate) language: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttachCodeRequest {
    #[validate(length(min = 1, max = 65536))]
    pub(crate) source_code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) problem_id: i64,
    pub(crate) language: Language,
    pub(crate) status: JudgeStatus,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) execution_time_ms: i32,
    pub(crate) memory_kb: i64,
    pub(crate) is_late: bool,
    pub(crate) attempt_number: i32,
    pub(crate) created_at: String,
    pub(crate) judged_at: Option<String>,
    pub(crate) results: Vec<SubmissionResultResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResultResponse {
    pub(crate) test_case_id: Option<i64>,
    pub(crate) test_case_index: i32,
    pub(crate) status: JudgeStatus,
    pub(crate) execution_time_ms: Option<i32>,
    pub(crate) memory_kb: Option<i64>,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) output_preview: Option<String>,
    pub(crate) error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProblemStatusResponse {
    pub(crate) problem_id: i64,
    pub(crate) total_submissions: i32,
    pub(crate) ac_submissions: i32,
    pub(crate) best_score: i32,
    pub(crate) solve_status: SolveStatus,
    pub(crate) best_time_ms: Option<i32>,
    pub(crate) best_memory_kb: Option<i64>,
    pub(crate) total_time_ms: i64,
    pub(crate) first_solved_at: Option<String>,
    pub(crate) last_submitted_at: Option<String>,
}

pub(crate) fn to_submission_response(
    submission: Submission,
    results: Vec<SubmissionResult>,
) -> SubmissionResponse {
    SubmissionResponse {
        id: submission.id,
        user_id: submission.user_id,
        problem_id: submission.problem_id,
        language: submission.language,
        status: submission.status,
        score: submission.score,
        max_score: submission.max_score,
        execution_time_ms: submission.execution_time_ms,
        memory_kb: submission.memory_kb,
        is_late: submission.is_late,
        attempt_number: submission.attempt_number,
        created_at: format_primitive(submission.created_at),
        judged_at: submission.judged_at.map(format_primitive),
        results: results.into_iter().map(to_result_response).collect(),
    }
}

fn to_result_response(result: SubmissionResult) -> SubmissionResultResponse {
    SubmissionResultResponse {
        test_case_id: result.test_case_id,
        test_case_index: result.test_case_index,
        status: result.status,
        execution_time_ms: result.execution_time_ms,
        memory_kb: result.memory_kb,
        score: result.score,
        max_score: result.max_score,
        output_preview: result.output_preview,
        error_message: result.error_message,
    }
}

pub(crate) fn to_problem_status_response(status: UserProblemStatus) -> ProblemStatusResponse {
    ProblemStatusResponse {
        problem_id: status.problem_id,
        total_submissions: status.total_submissions,
        ac_submissions: status.ac_submissions,
        best_score: status.best_score,
        solve_status: status.solve_status,
        best_time_ms: status.best_time_ms,
        best_memory_kb: status.best_memory_kb,
        total_time_ms: status.total_time_ms,
        first_solved_at: status.first_solved_at.map(format_primitive),
        last_submitted_at: status.last_submitted_at.map(format_primitive),
    }
}
