//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! 身份注入与超时由 ToolDispatcher 负责，工具自身只通过 Caller::from_args 读取已注入的身份。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::ToolError;

/// 注入参数名：调用方身份
pub const USER_ID_ARG: &str = "user_id";
/// 注入参数名：调用方凭证
pub const ACCESS_TOKEN_ARG: &str = "access_token";
/// 注入参数名：会话关联键
pub const CHAT_ID_ARG: &str = "chat_id";

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（不含注入字段）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否需要注入调用方身份与凭证
    fn requires_identity(&self) -> bool {
        false
    }

    /// 是否需要注入会话关联键（chat_id = session_id）
    fn session_scoped(&self) -> bool {
        false
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// 工具从参数中读到的调用方身份（由 dispatcher 注入，模型无法伪造）
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub chat_id: Option<String>,
}

impl Caller {
    /// 身份或凭证缺失时返回 MissingIdentity
    pub fn from_args(args: &Value) -> Result<Self, ToolError> {
        let user_id = args
            .get(USER_ID_ARG)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let has_token = args
            .get(ACCESS_TOKEN_ARG)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());

        match (user_id, has_token) {
            (Some(user_id), true) => Ok(Self {
                user_id: user_id.to_string(),
                chat_id: args
                    .get(CHAT_ID_ARG)
                    .and_then(Value::as_str)
                    .map(String::from),
            }),
            _ => {
                tracing::error!(
                    has_user_id = user_id.is_some(),
                    has_access_token = has_token,
                    "tool called without authentication context"
                );
                Err(ToolError::MissingIdentity)
            }
        }
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（有序，保证 schema 输出稳定）
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 动态生成工具 schema JSON（与实际注册的工具一致）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    #[async_trait]
    impl Tool for Ping {
        fn name(&self) -> &str {
            "ping"
        }
        fn description(&self) -> &str {
            "Reply with pong"
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Ok("pong".into())
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Ping);
        assert_eq!(registry.tool_names(), vec!["ping".to_string()]);
        let tool = registry.get("ping").unwrap();
        assert_eq!(tool.execute(Value::Null).await.unwrap(), "pong");
        assert!(registry.get("missing").is_none());
        assert!(registry.to_schema_json().contains("Reply with pong"));
    }

    #[test]
    fn test_caller_requires_user_and_token() {
        let ok = Caller::from_args(&serde_json::json!({
            "user_id": "u1", "access_token": "t", "chat_id": "s1"
        }))
        .unwrap();
        assert_eq!(ok.user_id, "u1");
        assert_eq!(ok.chat_id.as_deref(), Some("s1"));

        assert!(matches!(
            Caller::from_args(&serde_json::json!({"user_id": "u1"})),
            Err(ToolError::MissingIdentity)
        ));
        assert!(matches!(
            Caller::from_args(&serde_json::json!({"user_id": "", "access_token": "t"})),
            Err(ToolError::MissingIdentity)
        ));
    }
}
