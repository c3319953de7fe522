use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::hashing::sha256_hex;
use crate::db::types::Language;

#[derive(Debug, Error)]
pub(crate) enum DispatchError {
    /// The dispatch itself is invalid (e.g. the referenced problem no longer
    /// resolves); retrying cannot help.
    #[error("dispatch rejected: {0}")]
    Rejected(String),
    /// The sandbox was unreachable, timed out, or answered outside 2xx. The
    /// task runner retries these.
    #[error("sandbox transport failure: {0}")]
    Transport(String),
}

impl DispatchError {
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SolutionDispatch<'a> {
    pub(crate) submission_id: &'a str,
    pub(crate) problem_id: i64,
    pub(crate) problem_hash: &'a str,
    pub(crate) language: Language,
    pub(crate) source_code: &'a str,
    pub(crate) time_limit_ms: u32,
    pub(crate) memory_limit_mb: u32,
    pub(crate) use_checker: bool,
    pub(crate) checker_name: Option<&'a str>,
    pub(crate) use_static_analysis: bool,
    pub(crate) priority: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct CustomTestDispatch<'a> {
    pub(crate) custom_test_id: &'a str,
    pub(crate) language: Language,
    pub(crate) source_code: &'a str,
    pub(crate) stdin: &'a str,
    pub(crate) time_limit_ms: u32,
    pub(crate) memory_limit_mb: u32,
    pub(crate) priority: i32,
}

/// Outbound side of the sandbox wire contract. The task runner depends on
/// this trait, not on the concrete client, so tests can inject a failing or
/// recording fake.
#[async_trait]
pub(crate) trait SandboxDispatch: Send + Sync {
    async fn submit_solution(&self, request: SolutionDispatch<'_>)
        -> Result<Value, DispatchError>;

    async fn submit_custom_test(
        &self,
        request: CustomTestDispatch<'_>,
    ) -> Result<Value, DispatchError>;
}

#[async_trait]
pub(crate) trait SimilarityCheck: Send + Sync {
    /// Run a similarity check for every submission of a problem; resolves to
    /// the report URL on success. Long-running on the sandbox side.
    async fn run_similarity_check(
        &self,
        problem_id: i64,
        language: Language,
    ) -> Result<String, DispatchError>;
}

#[derive(Debug, Clone)]
pub(crate) struct SandboxClient {
    client: Client,
    base_url: String,
    token: String,
}

impl SandboxClient {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let sandbox = settings.sandbox();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(sandbox.connect_timeout_seconds))
            .timeout(Duration::from_secs(sandbox.timeout_seconds))
            .build()
            .map_err(|err| anyhow::anyhow!("Failed to build sandbox HTTP client: {err}"))?;

        Ok(Self {
            client,
            base_url: sandbox.base_url.clone(),
            token: sandbox.token.clone(),
        })
    }

    async fn post_multipart(&self, path: &str, form: Form) -> Result<Value, DispatchError> {
        let endpoint = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&endpoint)
            .header("X-Api-Key", &self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;

        let status = response.status();
        let raw_body = response
            .text()
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(DispatchError::Transport(format!(
                "sandbox answered {status}: {}",
                extract_error_message(&raw_body)
            )));
        }

        // The acknowledgement body is passed through unchanged; nothing in
        // the pipeline interprets it beyond logging.
        Ok(serde_json::from_str::<Value>(&raw_body).unwrap_or(Value::String(raw_body)))
    }
}

#[async_trait]
impl SandboxDispatch for SandboxClient {
    async fn submit_solution(
        &self,
        request: SolutionDispatch<'_>,
    ) -> Result<Value, DispatchError> {
        let file_hash = sha256_hex(request.source_code.as_bytes());
        let form = Form::new()
            .text("submission_id", request.submission_id.to_string())
            .text("problem_id", request.problem_id.to_string())
            .text("problem_hash", request.problem_hash.to_string())
            .text("mode", "normal")
            .text("language", request.language.sandbox_name())
            .text("file_hash", file_hash)
            .text("time_limit", format!("{:.3}", request.time_limit_ms as f64 / 1000.0))
            .text("memory_limit", (request.memory_limit_mb as u64 * 1024).to_string())
            .text("use_checker", request.use_checker.to_string())
            .text("checker_name", request.checker_name.unwrap_or_default().to_string())
            .text("use_static_analysis", request.use_static_analysis.to_string())
            .text("priority", request.priority.to_string())
            .part(
                "file",
                Part::bytes(request.source_code.as_bytes().to_vec())
                    .file_name(request.language.source_filename()),
            );

        self.post_multipart("/judge", form).await
    }

    async fn submit_custom_test(
        &self,
        request: CustomTestDispatch<'_>,
    ) -> Result<Value, DispatchError> {
        let file_hash = sha256_hex(request.source_code.as_bytes());
        let form = Form::new()
            .text("submission_id", request.custom_test_id.to_string())
            .text("mode", "custom_test")
            .text("language", request.language.sandbox_name())
            .text("file_hash", file_hash)
            .text("time_limit", format!("{:.3}", request.time_limit_ms as f64 / 1000.0))
            .text("memory_limit", (request.memory_limit_mb as u64 * 1024).to_string())
            .text("priority", request.priority.to_string())
            .part(
                "file",
                Part::bytes(request.source_code.as_bytes().to_vec())
                    .file_name(request.language.source_filename()),
            )
            .part("input", Part::bytes(request.stdin.as_bytes().to_vec()).file_name("input.txt"));

        self.post_multipart("/judge", form).await
    }
}

#[async_trait]
impl SimilarityCheck for SandboxClient {
    async fn run_similarity_check(
        &self,
        problem_id: i64,
        language: Language,
    ) -> Result<String, DispatchError> {
        let form = Form::new()
            .text("problem_id", problem_id.to_string())
            .text("language", language.sandbox_name());

        let body = self.post_multipart("/copycat", form).await?;

        body.get("report_url")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                DispatchError::Transport(format!(
                    "copycat response missing report_url: {}",
                    body
                ))
            })
    }
}

fn extract_error_message(raw_body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(raw_body) else {
        return raw_body.chars().take(200).collect();
    };

    parsed
        .get("detail")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("message").and_then(Value::as_str))
        .or_else(|| parsed.get("error").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(DispatchError::Transport("timeout".into()).is_retryable());
        assert!(!DispatchError::Rejected("no such problem".into()).is_retryable());
    }

    #[test]
    fn extract_error_message_prefers_detail() {
        assert_eq!(extract_error_message("{\"detail\":\"bad form\"}"), "bad form");
        assert_eq!(extract_error_message("{\"error\":\"down\"}"), "down");
        assert_eq!(extract_error_message("plain text"), "plain text");
        assert_eq!(extract_error_message("{}"), "unknown_error");
    }
}
