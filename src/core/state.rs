//! 回合状态：TurnState 与阶段间的显式合并（StageUpdate）
//!
//! 每个阶段只返回 StageUpdate，由 TurnState::apply 合并；消息只追加不修改。
//! 凭证不参与序列化，检查点里不会出现。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::{Message, ToolCallRequest};
use crate::pipeline::PlanningDecision;

/// 调用方凭证：Debug 只显示长度，日志中不出现明文
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// 明文（仅在注入工具参数时使用）
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***, len={})", self.0.len())
    }
}

/// 单个回合的完整状态（检查点以 session_id 为键覆盖保存）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TurnState {
    pub messages: Vec<Message>,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(skip)]
    pub access_token: Option<Credential>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub primary_archetype: Option<String>,
    #[serde(default)]
    pub secondary_archetype: Option<String>,
    #[serde(default)]
    pub brain_decision: Option<PlanningDecision>,
    #[serde(default)]
    pub response_strategy: Option<String>,
    /// 旧版标志：Router 兜底规则使用
    #[serde(default)]
    pub needs_context: bool,
    /// 本回合已完成的 brain ↔ context_gathering 往返次数
    #[serde(default)]
    pub tool_cycles: u32,
}

/// 阶段产出的增量：messages 追加，其余字段 Some 时覆盖
#[derive(Clone, Debug, Default)]
pub struct StageUpdate {
    pub messages: Vec<Message>,
    pub brain_decision: Option<PlanningDecision>,
    pub response_strategy: Option<String>,
    pub needs_context: Option<bool>,
}

impl StageUpdate {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

impl TurnState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// 合并阶段增量
    pub fn apply(&mut self, update: StageUpdate) {
        self.messages.extend(update.messages);
        if let Some(decision) = update.brain_decision {
            self.brain_decision = Some(decision);
        }
        if let Some(strategy) = update.response_strategy {
            self.response_strategy = Some(strategy);
        }
        if let Some(flag) = update.needs_context {
            self.needs_context = flag;
        }
    }

    /// 最新一条消息携带的工具调用请求（非工具调用载体时为空）
    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        self.messages
            .last()
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 用于日志：只记录是否存在与长度
    pub fn credential_len(&self) -> usize {
        self.access_token.as_ref().map(Credential::len).unwrap_or(0)
    }

    /// 开始新回合：清掉上一回合的决策与往返计数，保留历史与策略
    pub fn begin_turn(&mut self) {
        self.brain_decision = None;
        self.needs_context = false;
        self.tool_cycles = 0;
    }
}
