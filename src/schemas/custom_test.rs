use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::CustomTest;
use crate::db::types::{CustomRunStatus, Language};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateCustomTestRequest {
    pub(crate) language: String,
    #[validate(length(min = 1, max = 65536))]
    pub(crate) source_code: String,
    #[serde(default)]
    pub(crate) stdin: String,
    #[serde(default)]
    pub(crate) problem_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomTestResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) problem_id: Option<i64>,
    pub(crate) language: Language,
    pub(crate) status: CustomRunStatus,
    pub(crate) stdout_preview: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: String,
    pub(crate) finished_at: Option<String>,
}

pub(crate) fn to_custom_test_response(custom_test: CustomTest) -> CustomTestResponse {
    CustomTestResponse {
        id: custom_test.id,
        user_id: custom_test.user_id,
        problem_id: custom_test.problem_id,
        language: custom_test.language,
        status: custom_test.status,
        stdout_preview: custom_test.stdout_preview,
        error: custom_test.error,
        created_at: format_primitive(custom_test.created_at),
        finished_at: custom_test.finished_at.map(format_primitive),
    }
}
