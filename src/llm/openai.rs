//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 采样参数随部署环境变化：development 用 top_p 0.8，production 用 top_p 0.95 并带轻微惩罚项，staging / test 不额外设置。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::Environment;
use crate::llm::{LlmClient, LlmError, TokenStream};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 单次请求的采样参数
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl SamplingParams {
    /// 按部署环境给出采样参数；temperature / max_tokens 来自配置
    pub fn for_environment(env: Environment, temperature: f32, max_tokens: u32) -> Self {
        let base = Self {
            temperature,
            max_tokens,
            top_p: None,
            presence_penalty: None,
            frequency_penalty: None,
        };
        match env {
            Environment::Development => Self {
                top_p: Some(0.8),
                ..base
            },
            Environment::Production => Self {
                top_p: Some(0.95),
                presence_penalty: Some(0.1),
                frequency_penalty: Some(0.1),
                ..base
            },
            Environment::Staging | Environment::Test => base,
        }
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名与采样参数
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    sampling: SamplingParams,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        sampling: SamplingParams,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            sampling,
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 转换为 API 消息。tool 结果作为 user 侧观察文本送回，纯工具调用载体作为 assistant 文本。
    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => {
                        let content = if m.has_tool_calls() && !m.has_content() {
                            format!(
                                "Tool calls: {}",
                                serde_json::to_string(&m.tool_calls).unwrap_or_default()
                            )
                        } else {
                            m.content.clone()
                        };
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(content)
                            .build()
                            .map(ChatCompletionRequestMessage::Assistant)
                    }
                    Role::Tool => ChatCompletionRequestUserMessageArgs::default()
                        .content(format!(
                            "Observation from {} [{}]: {}",
                            m.name.as_deref().unwrap_or("tool"),
                            m.tool_call_id.as_deref().unwrap_or("-"),
                            m.content
                        ))
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                };
                built.map_err(|e| LlmError::InvalidRequest(e.to_string()))
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .temperature(self.sampling.temperature)
            .max_completion_tokens(self.sampling.max_tokens);
        if let Some(p) = self.sampling.top_p {
            args.top_p(p);
        }
        if let Some(p) = self.sampling.presence_penalty {
            args.presence_penalty(p);
        }
        if let Some(f) = self.sampling.frequency_penalty {
            args.frequency_penalty(f);
        }
        if stream {
            args.stream(true);
        }
        args.build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = self.build_request(messages, false)?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.request_timeout))?
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let request = self.build_request(messages, true)?;

        let stream = tokio::time::timeout(
            self.request_timeout,
            self.client.chat().create_stream(request),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.request_timeout))?
        .map_err(|e| LlmError::Provider(e.to_string()))?;

        let mapped = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(resp) => resp
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.clone())
                    .filter(|s| !s.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(LlmError::Provider(e.to_string()))),
            }
        });

        Ok(Box::pin(mapped))
    }
}
