//! Coach - 教练型对话智能体后端
//!
//! 每个回合走「规划 → 工具 → 合成」三段式编排：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合状态、路由、重试降级、检查点、编排器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、结构化输出
//! - **memory**: 对话消息与调用方历史过滤
//! - **observability**: 日志初始化
//! - **payload**: 通知载荷提取与校验
//! - **pipeline**: Brain / Synthesizer 阶段、提示词、流式事件
//! - **tools**: 承诺 / 提醒 / 日记工具、注册表与分发器

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod payload;
pub mod pipeline;
pub mod tools;

pub use crate::core::{
    create_orchestrator, Orchestrator, OrchestratorBuilder, TurnFailure, TurnOutcome, TurnRequest,
};
pub use crate::payload::NotificationPayload;
