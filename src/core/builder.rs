//! 编排器构建：统一的初始化逻辑（模型、降级模型、工具、检查点、提示词）
//!
//! REPL、测试与其它接入方式共用同一套装配，避免各处注册的工具或重试参数不一致。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, Environment};
use crate::core::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use crate::core::orchestrator::Orchestrator;
use crate::core::retry::RetryPolicy;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, SamplingParams};
use crate::pipeline::{
    load_prompt, BrainStage, SynthesizerStage, DEFAULT_BRAIN_PROMPT, DEFAULT_SYNTHESIZER_PROMPT,
};
use crate::tools::{register_default_tools, MemoryRecordStore, ToolDispatcher, ToolRegistry};

/// 编排器构建器
pub struct OrchestratorBuilder {
    llm: Arc<dyn LlmClient>,
    fallback: Option<Arc<dyn LlmClient>>,
    registry: Option<ToolRegistry>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    environment: Environment,
    max_retries: u32,
    backoff: Duration,
    max_tool_cycles: u32,
    tool_timeout_secs: u64,
    parallel_tools: bool,
    brain_prompt: String,
    synthesizer_prompt: String,
}

impl OrchestratorBuilder {
    /// 默认：development、3 次尝试、6 次工具往返、内存检查点、默认工具集
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback: None,
            registry: None,
            checkpoints: Some(Arc::new(MemoryCheckpointStore::new())),
            environment: Environment::Development,
            max_retries: 3,
            backoff: Duration::ZERO,
            max_tool_cycles: 6,
            tool_timeout_secs: 30,
            parallel_tools: true,
            brain_prompt: DEFAULT_BRAIN_PROMPT.to_string(),
            synthesizer_prompt: DEFAULT_SYNTHESIZER_PROMPT.to_string(),
        }
    }

    /// 按配置取参数，提示词可被 config/prompts/*.md 覆盖
    pub fn from_config(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            environment: cfg.app.environment,
            max_retries: cfg.llm.max_retries,
            max_tool_cycles: cfg.agent.max_tool_cycles,
            tool_timeout_secs: cfg.agent.tool_timeout_secs,
            parallel_tools: cfg.agent.parallel_tools,
            brain_prompt: load_prompt("brain", DEFAULT_BRAIN_PROMPT),
            synthesizer_prompt: load_prompt("synthesizer", DEFAULT_SYNTHESIZER_PROMPT),
            ..Self::new(llm)
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LlmClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Option<Arc<dyn CheckpointStore>>) -> Self {
        self.checkpoints = store;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_tool_cycles(mut self, cycles: u32) -> Self {
        self.max_tool_cycles = cycles;
        self
    }

    pub fn with_tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }

    pub fn with_prompts(mut self, brain: impl Into<String>, synthesizer: impl Into<String>) -> Self {
        self.brain_prompt = brain.into();
        self.synthesizer_prompt = synthesizer.into();
        self
    }

    pub fn build(self) -> Orchestrator {
        let mut retry = RetryPolicy::new(self.max_retries, self.environment).with_backoff(self.backoff);
        if let Some(fallback) = self.fallback {
            retry = retry.with_fallback(fallback);
        }

        let registry = self.registry.unwrap_or_else(|| {
            let mut registry = ToolRegistry::new();
            register_default_tools(&mut registry, Arc::new(MemoryRecordStore::new()));
            registry
        });
        tracing::info!(
            tools = ?registry.tool_names(),
            environment = %self.environment.as_str(),
            model = %self.llm.model(),
            max_attempts = retry.max_attempts(),
            max_tool_cycles = self.max_tool_cycles,
            checkpoints = self.checkpoints.is_some(),
            "orchestrator ready"
        );

        Orchestrator {
            brain: BrainStage::new(self.llm.clone(), retry.clone(), self.brain_prompt),
            synthesizer: SynthesizerStage::new(self.llm, retry, self.synthesizer_prompt),
            dispatcher: ToolDispatcher::new(Arc::new(registry), self.tool_timeout_secs)
                .with_parallel(self.parallel_tools),
            checkpoints: self.checkpoints,
            max_tool_cycles: self.max_tool_cycles,
        }
    }
}

/// 按配置创建模型句柄：(主模型, 降级模型)；有 OPENAI_API_KEY 走 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> (Arc<dyn LlmClient>, Option<Arc<dyn LlmClient>>) {
    let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
        tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
        return (Arc::new(MockLlmClient::default()), None);
    };

    let sampling =
        SamplingParams::for_environment(cfg.app.environment, cfg.llm.temperature, cfg.llm.max_tokens);
    let timeout = Duration::from_secs(cfg.llm.timeouts.request);
    let make = |model: &str| -> Arc<dyn LlmClient> {
        Arc::new(
            OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                model,
                Some(api_key.as_str()),
                sampling.clone(),
            )
            .with_request_timeout(timeout),
        )
    };

    tracing::info!(
        provider = %cfg.llm.provider,
        model = %cfg.llm.model,
        fallback_model = %cfg.llm.fallback_model,
        "using OpenAI-compatible LLM"
    );
    let fallback = (!cfg.llm.fallback_model.trim().is_empty()).then(|| make(&cfg.llm.fallback_model));
    (make(&cfg.llm.model), fallback)
}

/// 打开检查点存储：配置了 db_path 用 SQLite，否则用内存
pub async fn open_checkpoint_store(cfg: &AppConfig) -> Result<Arc<dyn CheckpointStore>, AgentError> {
    match &cfg.checkpoint.db_path {
        None => Ok(Arc::new(MemoryCheckpointStore::new())),
        #[cfg(feature = "async-sqlite")]
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AgentError::ConfigError(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
            let store = crate::core::checkpoint::SqliteCheckpointStore::new(path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "async-sqlite"))]
        Some(path) => Err(AgentError::ConfigError(format!(
            "checkpoint.db_path {} requires the async-sqlite feature",
            path.display()
        ))),
    }
}

/// 启动时解析检查点：production 下存储不可用则降级为无检查点继续运行，其它环境直接失败
pub async fn resolve_checkpoint_store(
    cfg: &AppConfig,
) -> Result<Option<Arc<dyn CheckpointStore>>, AgentError> {
    match open_checkpoint_store(cfg).await {
        Ok(store) => Ok(Some(store)),
        Err(e) if cfg.app.environment.is_production() => {
            tracing::warn!(error = %e, "checkpoint store unavailable, continuing without it");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// 便捷函数：加载配置（失败用默认值）并构建编排器
pub async fn create_orchestrator(config_path: Option<PathBuf>) -> Result<Orchestrator, AgentError> {
    let cfg = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (llm, fallback) = create_llm_from_config(&cfg);
    let checkpoints = resolve_checkpoint_store(&cfg).await?;

    let mut builder = OrchestratorBuilder::from_config(&cfg, llm).with_checkpoint_store(checkpoints);
    if let Some(fallback) = fallback {
        builder = builder.with_fallback(fallback);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_sqlite_path_degrades_only_in_production() {
        let dir = tempfile::tempdir().unwrap();
        // 父路径是文件，无法创建数据库
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let mut cfg = AppConfig::default();
        cfg.checkpoint.db_path = Some(blocker.join("cp.db"));

        cfg.app.environment = Environment::Development;
        assert!(resolve_checkpoint_store(&cfg).await.is_err());

        cfg.app.environment = Environment::Production;
        assert!(resolve_checkpoint_store(&cfg).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_store_is_in_memory() {
        let cfg = AppConfig::default();
        assert!(resolve_checkpoint_store(&cfg).await.unwrap().is_some());
    }
}
