//! 对话历史：消息、角色、工具调用请求
//!
//! 单轮内只追加不修改；返回给调用方前经 filter_for_caller 过滤掉空内容与纯工具调用载体。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，多一个 Tool 用于工具结果）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Brain 阶段产出的工具调用请求：{"tool": "...", "args": {...}, "id": "call_..."}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            tool: tool.into(),
            args,
        }
    }
}

/// 单条消息
///
/// - assistant 消息可携带 tool_calls（纯工具调用载体时 content 为空）与 response_strategy
/// - tool 消息携带 tool_call_id 与 name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_strategy: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            response_strategy: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// 工具结果消息（成功内容或错误描述都放在 content 里）
    pub fn tool_result(
        tool: impl Into<String>,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.name = Some(tool.into());
        msg.tool_call_id = Some(call_id.into());
        msg
    }

    /// 纯工具调用载体：content 为空，只带 tool_calls
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, String::new());
        msg.tool_calls = calls;
        msg
    }

    pub fn with_strategy(mut self, strategy: Option<String>) -> Self {
        self.response_strategy = strategy.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// 调用方可见的历史：仅保留 user / assistant 且内容非空（空白、纯工具调用载体、tool/system 消息都被过滤）
pub fn filter_for_caller(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .filter(|m| m.has_content())
        .map(|m| Message {
            role: m.role,
            content: m.content.clone(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            response_strategy: m.response_strategy.clone(),
        })
        .collect()
}

/// 最近一条 user 消息内容
pub fn latest_user_content(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

/// 最近一条携带 response_strategy 的消息中的策略（用于跨轮连贯）
pub fn latest_strategy(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find_map(|m| m.response_strategy.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_drops_empty_and_tool_carriers() {
        let messages = vec![
            Message::assistant(""),
            Message::user("hello"),
            Message::tool_calls(vec![ToolCallRequest::new("echo", serde_json::json!({}))]),
            Message::tool_result("echo", "call_1", "ok"),
            Message::assistant("   \n"),
        ];
        let filtered = filter_for_caller(&messages);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].role, Role::User);
        assert_eq!(filtered[0].content, "hello");
    }

    #[test]
    fn test_filter_keeps_strategy_on_assistant() {
        let messages = vec![Message::assistant("hi").with_strategy(Some("greet".into()))];
        let filtered = filter_for_caller(&messages);
        assert_eq!(filtered[0].response_strategy.as_deref(), Some("greet"));
    }

    #[test]
    fn test_latest_strategy_picks_most_recent() {
        let messages = vec![
            Message::assistant("a").with_strategy(Some("first".into())),
            Message::user("q"),
            Message::assistant("b").with_strategy(Some("second".into())),
            Message::user("q2"),
        ];
        assert_eq!(latest_strategy(&messages), Some("second"));
        assert_eq!(latest_user_content(&messages), Some("q2"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("x")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("tool_calls"));
    }
}
