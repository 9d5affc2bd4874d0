//! 核心编排层：错误、回合状态、路由、重试降级、检查点、编排器与构建器

pub mod builder;
pub mod checkpoint;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod router;
pub mod state;

pub use builder::{
    create_llm_from_config, create_orchestrator, open_checkpoint_store, resolve_checkpoint_store,
    OrchestratorBuilder,
};
#[cfg(feature = "async-sqlite")]
pub use checkpoint::SqliteCheckpointStore;
pub use checkpoint::{CheckpointError, CheckpointStore, MemoryCheckpointStore};
pub use error::{is_user_facing_error, user_friendly_message, AgentError, GENERIC_ERROR_MESSAGE};
pub use orchestrator::{Orchestrator, TurnFailure, TurnOutcome, TurnRequest};
pub use retry::RetryPolicy;
pub use router::{enforce_cycle_limit, route_after_brain, Stage, SYNTHESIS_INDICATORS};
pub use state::{Credential, StageUpdate, TurnState};
