//! 模型调用的重试与降级策略
//!
//! 每次逻辑调用（Brain 规划、Synthesizer 合成）独立持有一个本地「当前模型句柄」：
//! 降级只影响本次调用的后续尝试，不会泄漏到其它回合或并发会话。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Environment;
use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};

/// 重试 / 降级策略（无内部可变状态，可在并发回合间共享）
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    environment: Environment,
    fallback: Option<Arc<dyn LlmClient>>,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, environment: Environment) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            environment,
            fallback: None,
            backoff: Duration::ZERO,
        }
    }

    /// 仅 production 生效的降级模型
    pub fn with_fallback(mut self, fallback: Arc<dyn LlmClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// 两次尝试之间的等待（线性递增）
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 从第几次尝试（从 1 计）开始使用降级模型：倒数第二次，且至少是第 2 次
    fn fallback_from_attempt(&self) -> Option<u32> {
        if !self.environment.is_production() || self.fallback.is_none() || self.max_attempts < 2 {
            return None;
        }
        Some(self.max_attempts.saturating_sub(1).max(2))
    }

    /// 执行一次逻辑调用：成功立即返回；可重试失败继续，直到 max_attempts；不可重试失败直接终止
    pub async fn call<T, F, Fut>(
        &self,
        stage: &str,
        session_id: &str,
        primary: Arc<dyn LlmClient>,
        mut op: F,
    ) -> Result<T, AgentError>
    where
        F: FnMut(Arc<dyn LlmClient>) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let switch_at = self.fallback_from_attempt();
        let mut active = primary;
        let mut attempt: u32 = 1;

        loop {
            match op(active.clone()).await {
                Ok(value) => {
                    tracing::info!(
                        session_id = %session_id,
                        stage = %stage,
                        attempt,
                        model = %active.model(),
                        "model call completed"
                    );
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(
                        session_id = %session_id,
                        stage = %stage,
                        attempt,
                        model = %active.model(),
                        error = %e,
                        "model call failed with non-retryable error"
                    );
                    return Err(AgentError::ModelCallFatal {
                        stage: stage.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        stage = %stage,
                        attempt,
                        max_attempts = self.max_attempts,
                        model = %active.model(),
                        environment = %self.environment.as_str(),
                        error = %e,
                        "model call failed"
                    );

                    if attempt >= self.max_attempts {
                        return Err(AgentError::RetriesExhausted {
                            stage: stage.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let next = attempt + 1;
                    if switch_at == Some(next) {
                        if let Some(fallback) = &self.fallback {
                            tracing::warn!(
                                session_id = %session_id,
                                stage = %stage,
                                from = %active.model(),
                                model = %fallback.model(),
                                environment = %self.environment.as_str(),
                                "using fallback model"
                            );
                            active = fallback.clone();
                        }
                    }

                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                    attempt = next;
                }
            }
        }
    }
}
