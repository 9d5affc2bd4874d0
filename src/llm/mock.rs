//! Mock LLM 客户端（用于测试与无 API Key 的本地演示）
//!
//! 按顺序消费预置脚本（回复或错误）；脚本耗尽后回显最后一条 User 消息，
//! 回显内容同时满足规划与合成两种结构化格式，便于本地跑通整条编排流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, TokenStream};
use crate::memory::{latest_user_content, Message};

const CHUNK_CHARS: usize = 6;

/// Mock 客户端：脚本化回复 + 回显兜底，并记录每次调用收到的消息
#[derive(Debug)]
pub struct MockLlmClient {
    model: String,
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一组回复（按顺序消费）
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in replies {
            self.push_reply(r);
        }
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: LlmError) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// 已发生的调用次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 每次调用收到的完整消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match scripted {
            Some(reply) => reply,
            None => Ok(echo_reply(messages)),
        }
    }
}

fn echo_reply(messages: &[Message]) -> String {
    let last_user = latest_user_content(messages).unwrap_or("(no input)");
    let text = format!("Echo from Mock: {}", last_user);
    serde_json::json!({
        "complexity_level": "simple",
        "needs_tools": false,
        "needs_synthesis": false,
        "reasoning": "mock echo",
        "direct_response": text,
        "response_strategy": "echo",
        "response": text,
        "tool_calls": [],
    })
    .to_string()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.next_reply(messages)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let content = self.next_reply(messages)?;
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<Result<String, LlmError>> = chars
            .chunks(CHUNK_CHARS)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
