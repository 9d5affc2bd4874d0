//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Scripted）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! 所有失败都归一为 LlmError，由 RetryPolicy 依据 is_retryable 区分「再试一次」与「直接终止」。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;

/// 流式输出：每项为一段文本增量
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// 模型调用失败（提供方错误、超时、空结构化结果等）
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// 结构化输出反序列化为空 / null，视为失败而非成功
    #[error("Model returned an empty result")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 请求本身构造失败（参数非法等），重试无意义
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// 是否值得重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::InvalidRequest(_))
    }
}

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 当前句柄绑定的模型名（日志与降级判断用）
    fn model(&self) -> &str;

    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
