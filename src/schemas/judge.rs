use serde::Deserialize;

/// Inbound judge-result callback from the sandbox. `test_case_id` is null
/// when judging failed before any test ran (e.g. a compile error), in which
/// case every entry legitimately carries a null id.
#[derive(Debug, Deserialize)]
pub(crate) struct JudgeCallback {
    pub(crate) submission_id: String,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) score: i32,
    #[serde(default = "default_unmeasured")]
    pub(crate) execution_time: i32,
    #[serde(default = "default_unmeasured_kb")]
    pub(crate) memory_usage: i64,
    #[serde(default)]
    pub(crate) judge_server: Option<String>,
    #[serde(default)]
    pub(crate) test_results: Vec<TestResultPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TestResultPayload {
    #[serde(default)]
    pub(crate) test_case_id: Option<i64>,
    pub(crate) test_case_index: i32,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) execution_time: Option<i32>,
    #[serde(default)]
    pub(crate) memory_usage: Option<i64>,
    #[serde(default)]
    pub(crate) score: i32,
    #[serde(default)]
    pub(crate) max_score: i32,
    #[serde(default)]
    pub(crate) output: Option<String>,
    #[serde(default)]
    pub(crate) error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomTestCallback {
    pub(crate) custom_test_id: String,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) stdout: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

fn default_unmeasured() -> i32 {
    -1
}

fn default_unmeasured_kb() -> i64 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_with_full_results_deserializes() {
        let payload: JudgeCallback = serde_json::from_str(
            r#"{
                "submission_id": "abc",
                "status": "accepted",
                "score": 100,
                "execution_time": 12,
                "memory_usage": 2048,
                "test_results": [
                    {
                        "test_case_id": 7,
                        "test_case_index": 1,
                        "status": "accepted",
                        "execution_time": 12,
                        "memory_usage": 2048,
                        "score": 100,
                        "max_score": 100
                    }
                ]
            }"#,
        )
        .expect("callback json");

        assert_eq!(payload.submission_id, "abc");
        assert_eq!(payload.test_results.len(), 1);
        assert_eq!(payload.test_results[0].test_case_id, Some(7));
        assert_eq!(payload.test_results[0].error_message, None);
    }

    #[test]
    fn compile_error_callback_with_null_test_case_ids() {
        let payload: JudgeCallback = serde_json::from_str(
            r#"{
                "submission_id": "abc",
                "status": "compile_error",
                "test_results": [
                    {"test_case_id": null, "test_case_index": 1, "status": "compile_error",
                     "error_message": "main.c:1: expected ';'"},
                    {"test_case_id": null, "test_case_index": 2, "status": "compile_error",
                     "error_message": "main.c:2: unknown type"}
                ]
            }"#,
        )
        .expect("callback json");

        assert_eq!(payload.score, 0);
        assert_eq!(payload.execution_time, -1);
        assert_eq!(payload.memory_usage, -1);
        assert!(payload.test_results.iter().all(|entry| entry.test_case_id.is_none()));
        assert!(payload.test_results.iter().all(|entry| entry.error_message.is_some()));
    }
}
