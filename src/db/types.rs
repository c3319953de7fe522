use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "courserole", rename_all = "lowercase")]
pub(crate) enum CourseRole {
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "judgelanguage", rename_all = "lowercase")]
pub(crate) enum Language {
    C,
    Cpp,
    Python,
    Java,
    Javascript,
}

impl Language {
    /// Language identifier in the sandbox wire format.
    pub(crate) fn sandbox_name(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Python => "python",
            Self::Java => "java",
            Self::Javascript => "javascript",
        }
    }

    /// Filename used for the source file part of a dispatch request.
    pub(crate) fn source_filename(self) -> &'static str {
        match self {
            Self::C => "main.c",
            Self::Cpp => "main.cpp",
            Self::Python => "main.py",
            Self::Java => "Main.java",
            Self::Javascript => "main.js",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "c" => Some(Self::C),
            "cpp" | "c++" => Some(Self::Cpp),
            "python" | "python3" => Some(Self::Python),
            "java" => Some(Self::Java),
            "javascript" | "js" => Some(Self::Javascript),
            _ => None,
        }
    }

    pub(crate) fn supported_names() -> &'static [&'static str] {
        &["c", "cpp", "python", "java", "javascript"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "judgestatus", rename_all = "snake_case")]
pub(crate) enum JudgeStatus {
    AwaitingCode,
    Pending,
    Accepted,
    WrongAnswer,
    CompileError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    JudgeError,
    OutputLimitExceeded,
}

impl JudgeStatus {
    /// Map the sandbox's wire status string to a terminal judge status.
    /// Returns `None` for unknown strings and for non-terminal states, which
    /// the sandbox must never send in a callback.
    pub(crate) fn from_wire(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(Self::Accepted),
            "wrong_answer" => Some(Self::WrongAnswer),
            "compile_error" => Some(Self::CompileError),
            "time_limit_exceeded" => Some(Self::TimeLimitExceeded),
            "memory_limit_exceeded" => Some(Self::MemoryLimitExceeded),
            "runtime_error" => Some(Self::RuntimeError),
            "judge_error" => Some(Self::JudgeError),
            "output_limit_exceeded" => Some(Self::OutputLimitExceeded),
            _ => None,
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        !matches!(self, Self::AwaitingCode | Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "solvestatus", rename_all = "snake_case")]
pub(crate) enum SolveStatus {
    NeverTried,
    Attempted,
    PartialSolved,
    FullySolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "plagiarismstatus", rename_all = "lowercase")]
pub(crate) enum PlagiarismStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "customrunstatus", rename_all = "lowercase")]
pub(crate) enum CustomRunStatus {
    Pending,
    Finished,
    Failed,
}
