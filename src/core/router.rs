//! 路由：由最新规划决策决定下一阶段（纯函数，无 I/O）
//!
//! 规则按顺序匹配：
//! 1. 有直接回复 → End
//! 2. needs_tools 且最新消息带工具调用 → ContextGathering
//! 3. needs_tools 但没有产出工具调用 → Synthesizer
//! 4. needs_synthesis → Synthesizer
//! 5. 其余 → End
//!
//! 没有结构化决策时走兜底启发式。往返次数上限由 enforce_cycle_limit 单独施加。

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::pipeline::PlanningDecision;

/// 状态机的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Brain,
    ContextGathering,
    Synthesizer,
    End,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Brain => "brain",
            Stage::ContextGathering => "context_gathering",
            Stage::Synthesizer => "synthesizer",
            Stage::End => "end",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 出现这些短语说明回答还不完整，需要交给合成阶段
pub const SYNTHESIS_INDICATORS: &[&str] = &[
    "need to gather",
    "require additional",
    "let me search",
    "need more information",
    "synthesize",
    "analyze further",
];

/// Brain 之后的路由
pub fn route_after_brain(
    decision: Option<&PlanningDecision>,
    latest: Option<&Message>,
    needs_context: bool,
) -> Stage {
    let has_tool_calls = latest.map(Message::has_tool_calls).unwrap_or(false);

    if let Some(d) = decision {
        if d.direct_response().is_some() {
            return Stage::End;
        }
        if d.needs_tools {
            return if has_tool_calls {
                Stage::ContextGathering
            } else {
                Stage::Synthesizer
            };
        }
        if d.needs_synthesis {
            return Stage::Synthesizer;
        }
        return Stage::End;
    }

    fallback_route(latest, needs_context)
}

/// 无结构化决策时的兜底
fn fallback_route(latest: Option<&Message>, needs_context: bool) -> Stage {
    if needs_context {
        return Stage::ContextGathering;
    }
    match latest {
        Some(m) if m.has_content() && !m.has_tool_calls() => {
            let lower = m.content.to_lowercase();
            if SYNTHESIS_INDICATORS.iter().any(|p| lower.contains(p)) {
                Stage::Synthesizer
            } else {
                Stage::End
            }
        }
        _ => Stage::Synthesizer,
    }
}

/// 往返上限：已完成 max_cycles 次工具往返后，再要工具就强制合成
pub fn enforce_cycle_limit(next: Stage, completed_cycles: u32, max_cycles: u32) -> Stage {
    if next == Stage::ContextGathering && completed_cycles >= max_cycles {
        tracing::warn!(
            completed_cycles,
            max_cycles,
            "tool cycle limit reached, forcing synthesis"
        );
        Stage::Synthesizer
    } else {
        next
    }
}
