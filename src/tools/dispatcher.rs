//! 工具分发器
//!
//! 按名解析工具（未知工具 → 错误结果，不中断回合）；对需要身份的工具覆盖注入 user_id / access_token，
//! 对会话相关工具注入 chat_id；每次调用加超时并输出 JSON 审计日志。
//! 一批调用可并发执行，但结果始终按请求顺序返回。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::Credential;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::registry::{ACCESS_TOKEN_ARG, CHAT_ID_ARG, USER_ID_ARG};
use crate::tools::{Tool, ToolError, ToolRegistry};

/// 分发时的调用方上下文
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    pub session_id: &'a str,
    pub user_id: Option<&'a str>,
    pub access_token: Option<&'a Credential>,
}

/// 工具分发器：持有注册表、单次调用超时与并发开关
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    parallel: bool,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一批调用，结果顺序与请求顺序一致
    pub async fn dispatch_all(
        &self,
        calls: &[ToolCallRequest],
        ctx: &DispatchContext<'_>,
    ) -> Vec<Message> {
        if self.parallel && calls.len() > 1 {
            join_all(calls.iter().map(|call| self.dispatch(call, ctx))).await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for call in calls {
                out.push(self.dispatch(call, ctx).await);
            }
            out
        }
    }

    /// 执行单个调用；任何失败都编码为 Tool Result 内容，不向上抛
    pub async fn dispatch(&self, call: &ToolCallRequest, ctx: &DispatchContext<'_>) -> Message {
        tracing::info!(
            session_id = %ctx.session_id,
            tool = %call.tool,
            call_id = %call.id,
            "executing tool"
        );

        let start = Instant::now();
        let (result, preview) = match self.registry.get(&call.tool) {
            None => (
                Err(ToolError::UnknownTool {
                    name: call.tool.clone(),
                }),
                args_preview(&call.args),
            ),
            Some(tool) => match prepare_args(tool.as_ref(), &call.args, ctx) {
                Err(e) => (Err(e), args_preview(&call.args)),
                Ok(args) => {
                    let shown = args_preview(&redacted(&args));
                    let result = match timeout(self.timeout, tool.execute(args)).await {
                        Ok(r) => r,
                        Err(_) => Err(ToolError::Timeout(self.timeout)),
                    };
                    (result, shown)
                }
            },
        };

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(e) => (false, e.outcome()),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "session_id": ctx.session_id,
            "tool": call.tool,
            "call_id": call.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let content = match result {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(
                    session_id = %ctx.session_id,
                    tool = %call.tool,
                    error = %e,
                    "tool execution failed"
                );
                e.user_message(&call.tool)
            }
        };
        Message::tool_result(call.tool.clone(), call.id.clone(), content)
    }
}

/// 组装实际参数：身份字段一律以调用方上下文覆盖（缺失时删除），会话工具注入 chat_id
fn prepare_args(
    tool: &dyn Tool,
    raw: &Value,
    ctx: &DispatchContext<'_>,
) -> Result<Value, ToolError> {
    let mut args: Map<String, Value> = match raw {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "arguments must be an object, got {}",
                other
            )))
        }
    };

    if tool.requires_identity() {
        tracing::info!(
            tool = %tool.name(),
            has_user_id = ctx.user_id.is_some(),
            has_access_token = ctx.access_token.is_some(),
            access_token_len = ctx.access_token.map(Credential::len).unwrap_or(0),
            session_id = %ctx.session_id,
            "preparing user context"
        );
        args.remove(USER_ID_ARG);
        args.remove(ACCESS_TOKEN_ARG);
        if let Some(user_id) = ctx.user_id {
            args.insert(USER_ID_ARG.into(), Value::String(user_id.to_string()));
        }
        if let Some(token) = ctx.access_token {
            args.insert(
                ACCESS_TOKEN_ARG.into(),
                Value::String(token.expose().to_string()),
            );
        }
    }

    if tool.session_scoped() {
        args.insert(CHAT_ID_ARG.into(), Value::String(ctx.session_id.to_string()));
    }

    Ok(Value::Object(args))
}

fn redacted(args: &Value) -> Value {
    let mut copy = args.clone();
    if let Some(map) = copy.as_object_mut() {
        if map.contains_key(ACCESS_TOKEN_ARG) {
            map.insert(ACCESS_TOKEN_ARG.into(), Value::String("***".into()));
        }
    }
    copy
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
