//! 回合级错误类型与面向用户的错误文案
//!
//! 内部细节（会话、身份、阶段、底层错误）只写日志；返回给调用方的永远是 GENERIC_ERROR_MESSAGE。

use thiserror::Error;

use crate::core::checkpoint::CheckpointError;
use crate::llm::LlmError;

/// 统一的对外错误文案
pub const GENERIC_ERROR_MESSAGE: &str = "I'm experiencing some technical difficulties right now. \
Let's get back to this later. Is there anything else I can help you with?";

/// 单个回合运行中可能出现的致命错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 重试次数耗尽
    #[error("{stage} model call failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        stage: String,
        attempts: u32,
        #[source]
        source: LlmError,
    },

    /// 不可重试的模型调用失败（如请求构造错误）
    #[error("{stage} model call failed: {source}")]
    ModelCallFatal {
        stage: String,
        #[source]
        source: LlmError,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Turn cancelled")]
    Cancelled,
}

impl AgentError {
    /// 对外文案（不泄露内部细节）
    pub fn user_message(&self) -> &'static str {
        GENERIC_ERROR_MESSAGE
    }
}

const USER_FRIENDLY_PATTERNS: &[&str] = &[
    "You already have",
    "Please complete some existing",
    "Commitment text is required",
    "Commitment ID is required",
    "Invalid frequency",
    "Must specify either frequency or date",
    "Cannot specify both frequency and date",
];

const TECHNICAL_TERMS: &[&str] = &[
    "traceback", "exception", "stack", "error:", "failed:", "database", "sql", "sqlite",
    "connection", "timeout", "authentication", "token", "jwt", "credentials", "401", "500",
    "internal", "server", "client", "http", "api", "endpoint", "panic",
];

/// 判断一段错误描述能否原样展示给用户
///
/// 已知的业务规则文案直接放行；含技术术语的一律拦截。
pub fn is_user_facing_error(message: &str) -> bool {
    if USER_FRIENDLY_PATTERNS.iter().any(|p| message.contains(p)) {
        return true;
    }
    let lower = message.to_lowercase();
    if lower.contains("no reminder") {
        return true;
    }
    if lower.contains("validation error") && lower.contains("field") {
        return true;
    }
    !TECHNICAL_TERMS.iter().any(|t| lower.contains(t))
}

/// 技术细节写日志，返回可展示文案（原文安全则原样，否则通用文案）
pub fn user_friendly_message(detail: &str, context: &str) -> String {
    if is_user_facing_error(detail) {
        detail.to_string()
    } else {
        tracing::error!(context = %context, error = %detail, "technical error hidden from user");
        GENERIC_ERROR_MESSAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_messages_are_user_facing() {
        assert!(is_user_facing_error(
            "You already have 5 active commitments. Please complete some existing commitments before adding new ones."
        ));
        assert!(is_user_facing_error("Invalid frequency 'hourly'. Allowed values: daily"));
        assert!(is_user_facing_error("Great, all done"));
    }

    #[test]
    fn test_technical_messages_are_hidden() {
        assert!(!is_user_facing_error("sqlite connection refused"));
        assert!(!is_user_facing_error("HTTP 500 from upstream"));
        assert_eq!(
            user_friendly_message("database is locked", "test"),
            GENERIC_ERROR_MESSAGE
        );
    }

    #[test]
    fn test_agent_error_user_message_is_generic() {
        let err = AgentError::RetriesExhausted {
            stage: "brain".into(),
            attempts: 3,
            source: LlmError::Provider("secret upstream detail".into()),
        };
        assert!(err.to_string().contains("secret upstream detail"));
        assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
    }
}
