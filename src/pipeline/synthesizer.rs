//! Synthesizer 阶段：只用「原始问题 + 回答策略」生成最终回答，不重放完整历史，也不绑定工具

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RetryPolicy, StageUpdate, TurnState};
use crate::llm::{complete_structured, LlmClient};
use crate::memory::{latest_user_content, Message};
use crate::pipeline::events::{send_event, TurnEvent};
use crate::pipeline::prompts::STREAMING_SUFFIX;
use crate::pipeline::SynthesisResult;

const NO_QUESTION: &str = "No specific question found";
const NO_STRATEGY: &str = "No strategy provided";

pub struct SynthesizerStage {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    prompt: String,
}

impl SynthesizerStage {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy, prompt: impl Into<String>) -> Self {
        Self {
            llm,
            retry,
            prompt: prompt.into(),
        }
    }

    fn strategy(state: &TurnState) -> &str {
        state
            .response_strategy
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(NO_STRATEGY)
    }

    /// 发给模型的唯一一条 user 消息
    pub fn user_text(state: &TurnState) -> String {
        format!(
            "Original Question: {}\n\nResponse Strategy: {}",
            latest_user_content(&state.messages).unwrap_or(NO_QUESTION),
            Self::strategy(state)
        )
    }

    fn reply(state: &TurnState, text: String) -> StageUpdate {
        let strategy = Some(Self::strategy(state).to_string());
        StageUpdate::messages(vec![Message::assistant(text).with_strategy(strategy)])
    }

    pub async fn run(&self, state: &TurnState) -> Result<StageUpdate, AgentError> {
        let input = [Message::user(Self::user_text(state))];
        let input = input.as_slice();
        let system = self.prompt.as_str();

        let result: SynthesisResult = self
            .retry
            .call("synthesizer", &state.session_id, self.llm.clone(), |llm| async move {
                complete_structured::<SynthesisResult>(llm.as_ref(), system, input).await
            })
            .await?;

        tracing::info!(
            session_id = %state.session_id,
            stage = "synthesizer",
            has_strategy = state.response_strategy.is_some(),
            "synthesis completed"
        );
        Ok(Self::reply(state, result.response))
    }

    /// 流式合成：重试只覆盖建立流；每个增量作为 Token 事件推送。
    /// 取消或接收端关闭时停止推送并返回 Cancelled。
    pub async fn run_streaming(
        &self,
        state: &TurnState,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
        cancel: &CancellationToken,
    ) -> Result<StageUpdate, AgentError> {
        let input = [
            Message::system(format!("{}\n\n{}", self.prompt, STREAMING_SUFFIX)),
            Message::user(Self::user_text(state)),
        ];
        let input = input.as_slice();

        let mut stream = self
            .retry
            .call("synthesizer", &state.session_id, self.llm.clone(), |llm| async move {
                llm.complete_stream(input).await
            })
            .await?;

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(session_id = %state.session_id, "synthesis stream cancelled");
                    return Err(AgentError::Cancelled);
                }
                item = stream.next() => item,
            };
            match next {
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    if !send_event(event_tx, TurnEvent::Token { text: delta }) {
                        tracing::info!(session_id = %state.session_id, "event receiver closed, stopping stream");
                        return Err(AgentError::Cancelled);
                    }
                }
                Some(Err(e)) => {
                    return Err(AgentError::ModelCallFatal {
                        stage: "synthesizer".into(),
                        source: e,
                    })
                }
                None => break,
            }
        }

        tracing::info!(
            session_id = %state.session_id,
            stage = "synthesizer",
            chars = text.chars().count(),
            "streamed synthesis completed"
        );
        Ok(Self::reply(state, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::llm::MockLlmClient;

    fn stage(mock: Arc<MockLlmClient>) -> SynthesizerStage {
        SynthesizerStage::new(mock, RetryPolicy::new(3, Environment::Test), "SYNTH")
    }

    #[test]
    fn test_user_text_defaults() {
        let state = TurnState::new("s1");
        assert_eq!(
            SynthesizerStage::user_text(&state),
            "Original Question: No specific question found\n\nResponse Strategy: No strategy provided"
        );
    }

    #[tokio::test]
    async fn test_only_question_and_strategy_are_sent() {
        let mock = Arc::new(MockLlmClient::default().with_replies([r#"{"response":"Here you go"}"#]));
        let mut state = TurnState::new("s1");
        state.messages.push(Message::user("old question"));
        state.messages.push(Message::assistant("old answer"));
        state.messages.push(Message::user("plan my week"));
        state.response_strategy = Some("three bullet points".into());

        let update = stage(mock.clone()).run(&state).await.unwrap();
        assert_eq!(update.messages[0].content, "Here you go");
        assert_eq!(
            update.messages[0].response_strategy.as_deref(),
            Some("three bullet points")
        );

        let sent = &mock.calls()[0];
        assert_eq!(sent.len(), 2);
        assert!(sent[1].content.contains("Original Question: plan my week"));
        assert!(!sent.iter().any(|m| m.content.contains("old answer")));
    }

    #[tokio::test]
    async fn test_streaming_emits_tokens() {
        let mock = Arc::new(MockLlmClient::default().with_replies(["Keep going, you are close!"]));
        let mut state = TurnState::new("s1");
        state.messages.push(Message::user("motivate me"));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let update = stage(mock)
            .run_streaming(&state, Some(&tx), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(update.messages[0].content, "Keep going, you are close!");

        let mut streamed = String::new();
        while let Ok(ev) = rx.try_recv() {
            if let TurnEvent::Token { text } = ev {
                streamed.push_str(&text);
            }
        }
        assert_eq!(streamed, "Keep going, you are close!");
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops() {
        let mock = Arc::new(MockLlmClient::default().with_replies(["never shown"]));
        let mut state = TurnState::new("s1");
        state.messages.push(Message::user("hi"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = stage(mock)
            .run_streaming(&state, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
