//! 工具错误类型
//!
//! Display 文本是技术细节（写日志），user_message 是写进 Tool Result 的可展示文案。

use std::time::Duration;

use thiserror::Error;

use crate::core::error::{is_user_facing_error, user_friendly_message};
use crate::core::GENERIC_ERROR_MESSAGE;

pub const MISSING_IDENTITY_MESSAGE: &str = "Error: User authentication context not available";

/// 工具执行失败
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("User identity missing")]
    MissingIdentity,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// 业务规则拒绝，文案本身就是给用户看的
    #[error("{0}")]
    Rejected(String),

    #[error("Tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("Record store error: {0}")]
    Store(#[from] crate::tools::store::StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// 写进 Tool Result 的文案（技术细节不外泄）
    pub fn user_message(&self, tool: &str) -> String {
        match self {
            ToolError::UnknownTool { name } => {
                format!("Error: Unknown tool '{}'. Use one of the available tools.", name)
            }
            ToolError::MissingIdentity => MISSING_IDENTITY_MESSAGE.to_string(),
            ToolError::InvalidArguments(detail) => {
                if is_user_facing_error(detail) {
                    format!("Error: {}", detail)
                } else {
                    user_friendly_message(detail, tool)
                }
            }
            ToolError::Rejected(msg) => msg.clone(),
            ToolError::Timeout(_) | ToolError::Store(_) | ToolError::Internal(_) => {
                tracing::error!(tool = %tool, error = %self, "tool failed with technical error");
                GENERIC_ERROR_MESSAGE.to_string()
            }
        }
    }

    /// 审计日志里的 outcome 字段
    pub fn outcome(&self) -> &'static str {
        match self {
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::MissingIdentity => "missing_identity",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Rejected(_) => "rejected",
            ToolError::Timeout(_) => "timeout",
            ToolError::Store(_) | ToolError::Internal(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_technical_detail() {
        let err = ToolError::Internal("sqlite: database is locked".into());
        assert_eq!(err.user_message("fetch_user_reminders"), GENERIC_ERROR_MESSAGE);

        let timeout = ToolError::Timeout(Duration::from_secs(30));
        assert_eq!(timeout.user_message("x"), GENERIC_ERROR_MESSAGE);
        assert_eq!(timeout.outcome(), "timeout");
    }

    #[test]
    fn test_business_messages_pass_through() {
        let err = ToolError::Rejected("You already have 5 active commitments.".into());
        assert_eq!(err.user_message("create_user_commitment"), "You already have 5 active commitments.");
        assert_eq!(
            ToolError::MissingIdentity.user_message("x"),
            MISSING_IDENTITY_MESSAGE
        );
        assert_eq!(
            ToolError::InvalidArguments("missing field `commitment_id`".into()).user_message("x"),
            "Error: missing field `commitment_id`"
        );
        assert!(ToolError::UnknownTool { name: "nope".into() }
            .user_message("nope")
            .contains("nope"));
    }
}
