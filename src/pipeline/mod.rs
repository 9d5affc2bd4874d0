//! 三段式流水线：Brain（规划）、Synthesizer（合成）、结构化契约与过程事件

pub mod brain;
pub mod events;
pub mod prompts;
pub mod schema;
pub mod synthesizer;

pub use brain::BrainStage;
pub use events::{send_event, TurnEvent};
pub use prompts::{load_prompt, DEFAULT_BRAIN_PROMPT, DEFAULT_SYNTHESIZER_PROMPT};
pub use schema::{
    ComplexityLevel, PlannedToolCall, PlanningDecision, SynthesisResult, ToolCallPlan,
};
pub use synthesizer::SynthesizerStage;
