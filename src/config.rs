//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COACH__*` 覆盖（双下划线表示嵌套，如 `COACH__APP__ENVIRONMENT=production`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 部署环境：决定采样参数、是否启用降级模型、检查点不可用时是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub checkpoint: CheckpointSection,
}

/// [app] 段：应用名与部署环境
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

/// [llm] 段：模型、降级模型、采样参数、重试次数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 仅 production 下、倒数第二次尝试失败后切换
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 单次逻辑调用的最大尝试次数（含首次）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            fallback_model: default_fallback_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_fallback_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：编排循环上限与工具执行
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// brain ↔ context_gathering 最大往返次数，超出后强制进入合成
    #[serde(default = "default_max_tool_cycles")]
    pub max_tool_cycles: u32,
    /// 同一批工具调用是否并发执行（结果仍按请求顺序写回）
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_tool_cycles: default_max_tool_cycles(),
            parallel_tools: default_parallel_tools(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_max_tool_cycles() -> u32 {
    6
}

fn default_parallel_tools() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [checkpoint] 段：检查点存储；db_path 未设置时使用内存存储
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CheckpointSection {
    pub db_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 COACH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COACH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COACH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
