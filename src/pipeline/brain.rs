//! Brain 阶段：基于完整历史产出规划决策；需要工具时在同一次尝试内再生成工具调用
//!
//! 指令块 = 基础提示词 + 用户原型上下文 + 上一轮回答策略（保持跨轮连贯）。

use std::sync::Arc;

use crate::core::{AgentError, RetryPolicy, StageUpdate, TurnState};
use crate::llm::{complete_structured, LlmClient, LlmError};
use crate::memory::{latest_strategy, Message, ToolCallRequest};
use crate::pipeline::prompts::DEFAULT_TOOL_PROMPT;
use crate::pipeline::{PlanningDecision, ToolCallPlan};
use crate::tools::ToolRegistry;

pub struct BrainStage {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    base_prompt: String,
}

impl BrainStage {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy, base_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            retry,
            base_prompt: base_prompt.into(),
        }
    }

    /// 渲染本次调用的 system 指令
    pub fn instruction_block(&self, state: &TurnState) -> String {
        let mut out = self.base_prompt.clone();

        let primary = non_empty(state.primary_archetype.as_deref());
        let secondary = non_empty(state.secondary_archetype.as_deref());
        if primary.is_some() || secondary.is_some() {
            out.push_str("\n\nUSER ARCHETYPE CONTEXT:\n");
            if let Some(p) = primary {
                out.push_str(&format!("Primary Archetype: {}\n", p));
            }
            if let Some(s) = secondary {
                out.push_str(&format!("Secondary Archetype: {}\n", s));
            }
            if let Some(profile) = non_empty(state.profile.as_deref()) {
                out.push_str(&format!("Profile: {}\n", profile));
            }
        }

        if let Some(strategy) = latest_strategy(&state.messages) {
            out.push_str(&format!(
                "\n\nPREVIOUS RESPONSE'S STRATEGY:\nThis was the strategy used for the bot's last response: {}\n",
                strategy
            ));
        }
        out
    }

    pub async fn run(
        &self,
        state: &TurnState,
        registry: &ToolRegistry,
    ) -> Result<StageUpdate, AgentError> {
        let system = self.instruction_block(state);
        let tool_system = format!(
            "{}\n\n{}\n\nAVAILABLE TOOLS:\n{}",
            system,
            DEFAULT_TOOL_PROMPT,
            registry.to_schema_json()
        );
        let system = system.as_str();
        let tool_system = tool_system.as_str();
        let messages = state.messages.as_slice();

        let (decision, calls) = self
            .retry
            .call("brain", &state.session_id, self.llm.clone(), |llm| async move {
                let decision: PlanningDecision =
                    complete_structured(llm.as_ref(), system, messages).await?;
                let calls: Vec<ToolCallRequest> =
                    if decision.direct_response().is_none() && decision.needs_tools {
                        let plan: ToolCallPlan =
                            complete_structured(llm.as_ref(), tool_system, messages).await?;
                        plan.tool_calls
                            .into_iter()
                            .filter(|c| !c.tool.trim().is_empty())
                            .map(|c| ToolCallRequest::new(c.tool, c.args))
                            .collect()
                    } else {
                        Vec::new()
                    };
                Ok::<_, LlmError>((decision, calls))
            })
            .await?;

        tracing::info!(
            session_id = %state.session_id,
            stage = "brain",
            complexity = ?decision.complexity_level,
            needs_tools = decision.needs_tools,
            needs_synthesis = decision.needs_synthesis,
            has_direct_response = decision.direct_response().is_some(),
            tool_calls = calls.len(),
            "brain analysis completed"
        );

        let strategy = decision.strategy().map(String::from);
        let messages = if let Some(text) = decision.direct_response() {
            vec![Message::assistant(text).with_strategy(strategy.clone())]
        } else if decision.needs_tools && !calls.is_empty() {
            vec![Message::tool_calls(calls)]
        } else {
            Vec::new()
        };

        Ok(StageUpdate {
            messages,
            needs_context: Some(decision.needs_tools),
            response_strategy: strategy,
            brain_decision: Some(decision),
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}
