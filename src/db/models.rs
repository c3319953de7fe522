use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    CustomRunStatus, JudgeStatus, Language, PlagiarismStatus, SolveStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) is_platform_admin: bool,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Course {
    pub(crate) id: String,
    pub(crate) slug: String,
    pub(crate) title: String,
    pub(crate) is_active: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Problem {
    pub(crate) id: i64,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) content_hash: String,
    pub(crate) time_limit_ms: Option<i32>,
    pub(crate) memory_limit_mb: Option<i32>,
    pub(crate) use_checker: bool,
    pub(crate) checker_name: Option<String>,
    pub(crate) use_static_analysis: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) problem_id: i64,
    pub(crate) language: Language,
    pub(crate) source_code: String,
    pub(crate) code_hash: Option<String>,
    pub(crate) status: JudgeStatus,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) execution_time_ms: i32,
    pub(crate) memory_kb: i64,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) is_late: bool,
    pub(crate) has_penalty: bool,
    pub(crate) attempt_number: i32,
    pub(crate) judge_server: Option<String>,
    pub(crate) dispatch_attempts: i32,
    pub(crate) dispatch_started_at: Option<PrimitiveDateTime>,
    pub(crate) next_dispatch_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) judged_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SubmissionResult {
    pub(crate) id: i64,
    pub(crate) submission_id: String,
    pub(crate) test_case_id: Option<i64>,
    pub(crate) test_case_index: i32,
    pub(crate) status: JudgeStatus,
    pub(crate) execution_time_ms: Option<i32>,
    pub(crate) memory_kb: Option<i64>,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) output_preview: Option<String>,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct UserProblemStatus {
    pub(crate) user_id: String,
    pub(crate) problem_id: i64,
    pub(crate) total_submissions: i32,
    pub(crate) ac_submissions: i32,
    pub(crate) best_score: i32,
    pub(crate) first_solved_at: Option<PrimitiveDateTime>,
    pub(crate) last_submitted_at: Option<PrimitiveDateTime>,
    pub(crate) solve_status: SolveStatus,
    pub(crate) best_time_ms: Option<i32>,
    pub(crate) best_memory_kb: Option<i64>,
    pub(crate) total_time_ms: i64,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PlagiarismReport {
    pub(crate) id: String,
    pub(crate) problem_id: i64,
    pub(crate) requested_by: String,
    pub(crate) language: Language,
    pub(crate) status: PlagiarismStatus,
    pub(crate) report_url: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CustomTest {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) problem_id: Option<i64>,
    pub(crate) language: Language,
    pub(crate) source_code: String,
    pub(crate) stdin: String,
    pub(crate) status: CustomRunStatus,
    pub(crate) stdout_preview: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) dispatch_attempts: i32,
    pub(crate) dispatch_started_at: Option<PrimitiveDateTime>,
    pub(crate) next_dispatch_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
}
