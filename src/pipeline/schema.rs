//! 阶段输出的结构化契约：规划决策、工具调用计划、合成结果
//!
//! 这些类型同时用于生成 JSON Schema（拼进 system prompt）与反序列化模型回复。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 复杂度分级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    #[default]
    Simple,
    Moderate,
    Complex,
}

fn default_true() -> bool {
    true
}

/// Brain 阶段的规划决策：每次 Brain 调用产出一个，只读
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanningDecision {
    /// simple / moderate / complex
    #[serde(default)]
    pub complexity_level: ComplexityLevel,
    /// 是否需要调用工具获取上下文
    #[serde(default)]
    pub needs_tools: bool,
    /// 是否需要合成阶段生成最终回答（缺省为 true）
    #[serde(default = "default_true")]
    pub needs_synthesis: bool,
    /// 决策理由
    #[serde(default)]
    pub reasoning: String,
    /// 无需工具与合成即可回答时给出的直接回复
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_response: Option<String>,
    /// 选择工具的提示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_guidance: Option<String>,
    /// 回答策略，跨轮延续
    #[serde(default)]
    pub response_strategy: String,
}

impl PlanningDecision {
    /// 直接回复是否存在（空白视为不存在）
    pub fn direct_response(&self) -> Option<&str> {
        self.direct_response
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn strategy(&self) -> Option<&str> {
        Some(self.response_strategy.as_str()).filter(|s| !s.trim().is_empty())
    }

    /// 直接回答
    pub fn direct(text: impl Into<String>) -> Self {
        Self {
            complexity_level: ComplexityLevel::Simple,
            needs_tools: false,
            needs_synthesis: false,
            reasoning: String::new(),
            direct_response: Some(text.into()),
            tool_guidance: None,
            response_strategy: String::new(),
        }
    }

    /// 需要工具
    pub fn with_tools(strategy: impl Into<String>) -> Self {
        Self {
            complexity_level: ComplexityLevel::Moderate,
            needs_tools: true,
            needs_synthesis: true,
            reasoning: String::new(),
            direct_response: None,
            tool_guidance: None,
            response_strategy: strategy.into(),
        }
    }

    /// 直接交给合成阶段
    pub fn synthesize(strategy: impl Into<String>) -> Self {
        Self {
            needs_tools: false,
            ..Self::with_tools(strategy)
        }
    }
}

/// 单个工具调用（模型侧格式）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedToolCall {
    /// 工具名，必须是可用工具之一
    pub tool: String,
    /// 工具参数对象
    #[serde(default)]
    #[schemars(with = "std::collections::HashMap<String, serde_json::Value>")]
    pub args: serde_json::Value,
}

/// 工具调用计划：可以为空列表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ToolCallPlan {
    #[serde(default)]
    pub tool_calls: Vec<PlannedToolCall>,
}

/// 合成阶段输出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SynthesisResult {
    /// 给用户的最终回答
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_synthesis_defaults_true() {
        let d: PlanningDecision =
            serde_json::from_str(r#"{"complexity_level":"moderate","needs_tools":false,"reasoning":"r"}"#)
                .unwrap();
        assert!(d.needs_synthesis);
        assert_eq!(d.complexity_level, ComplexityLevel::Moderate);
        assert!(d.direct_response().is_none());
        assert!(d.strategy().is_none());
    }

    #[test]
    fn test_blank_direct_response_is_absent() {
        let mut d = PlanningDecision::direct("   ");
        assert!(d.direct_response().is_none());
        d.direct_response = Some("4".into());
        assert_eq!(d.direct_response(), Some("4"));
    }

    #[test]
    fn test_tool_call_plan_tolerates_missing_args() {
        let plan: ToolCallPlan =
            serde_json::from_str(r#"{"tool_calls":[{"tool":"fetch_user_reminders"}]}"#).unwrap();
        assert_eq!(plan.tool_calls.len(), 1);
        assert!(plan.tool_calls[0].args.is_null());
    }
}
