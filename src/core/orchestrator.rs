//! 编排器：单回合状态机
//!
//! brain → (context_gathering → brain)* → synthesizer → end，或 brain → end（直接回复）。
//! 每个阶段结束后写检查点（失败只记日志）；到达 end 时提取本回合的通知载荷并过滤历史。
//! 编排器本身无可变状态，可用 Arc 在并发会话间共享；同一会话的请求不能重叠（调用方约定）。

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::checkpoint::CheckpointStore;
use crate::core::error::{AgentError, GENERIC_ERROR_MESSAGE};
use crate::core::router::{enforce_cycle_limit, route_after_brain, Stage};
use crate::core::state::{Credential, StageUpdate, TurnState};
use crate::memory::{filter_for_caller, Message, Role};
use crate::payload::{extract_notification_payload, NotificationPayload};
use crate::pipeline::events::{preview, send_event, TurnEvent};
use crate::pipeline::{BrainStage, SynthesizerStage};
use crate::tools::{DispatchContext, ToolDispatcher};

/// 调用方一次请求的输入
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub session_id: String,
    /// 新消息；也可以是「已见历史 + 新消息」，已见部分会被跳过
    pub messages: Vec<Message>,
    pub user_id: Option<String>,
    pub access_token: Option<Credential>,
    pub profile: Option<String>,
    pub primary_archetype: Option<String>,
    pub secondary_archetype: Option<String>,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            ..Default::default()
        }
    }

    /// 单条 user 消息
    pub fn user(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, vec![Message::user(text)])
    }

    pub fn with_identity(mut self, user_id: impl Into<String>, token: Credential) -> Self {
        self.user_id = Some(user_id.into());
        self.access_token = Some(token);
        self
    }

    pub fn with_archetypes(
        mut self,
        primary: Option<String>,
        secondary: Option<String>,
        profile: Option<String>,
    ) -> Self {
        self.primary_archetype = primary;
        self.secondary_archetype = secondary;
        self.profile = profile;
        self
    }
}

/// 回合结果：调用方可见的历史 + 可选通知载荷
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub messages: Vec<Message>,
    pub payload: Option<NotificationPayload>,
}

impl TurnOutcome {
    /// 最后一条 assistant 回复
    pub fn reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// 回合失败：Display 永远是通用文案，细节只在 source 与日志中
#[derive(Debug, Error)]
#[error("{}", GENERIC_ERROR_MESSAGE)]
pub struct TurnFailure {
    pub session_id: String,
    pub stage: Stage,
    #[source]
    pub error: AgentError,
}

impl TurnFailure {
    pub fn user_message(&self) -> &'static str {
        self.error.user_message()
    }
}

/// 编排器（由 OrchestratorBuilder 构建）
pub struct Orchestrator {
    pub(crate) brain: BrainStage,
    pub(crate) synthesizer: SynthesizerStage,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) checkpoints: Option<Arc<dyn CheckpointStore>>,
    pub(crate) max_tool_cycles: u32,
}

/// 流式回合的输出端
struct Streaming<'a> {
    tx: &'a UnboundedSender<TurnEvent>,
    cancel: &'a CancellationToken,
}

impl Orchestrator {
    /// 非流式回合
    pub async fn respond(&self, request: TurnRequest) -> Result<TurnOutcome, TurnFailure> {
        self.run_turn(request, None).await
    }

    /// 流式回合：推送阶段、工具、Token 与结束事件；取消或接收端关闭后停止推送，已完成的进度保留在检查点中
    pub async fn respond_stream(
        &self,
        request: TurnRequest,
        event_tx: UnboundedSender<TurnEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnFailure> {
        let streaming = Streaming {
            tx: &event_tx,
            cancel: &cancel,
        };
        let result = self.run_turn(request, Some(streaming)).await;
        if let Err(failure) = &result {
            if !matches!(failure.error, AgentError::Cancelled) {
                send_event(
                    Some(&event_tx),
                    TurnEvent::Error {
                        text: failure.user_message().to_string(),
                    },
                );
            }
        }
        result
    }

    /// 调用方可见的会话历史
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        let Some(store) = &self.checkpoints else {
            return Ok(Vec::new());
        };
        let state = store.get(session_id).await?;
        Ok(state
            .map(|s| filter_for_caller(&s.messages))
            .unwrap_or_default())
    }

    /// 删除会话检查点
    pub async fn clear_history(&self, session_id: &str) -> Result<(), AgentError> {
        if let Some(store) = &self.checkpoints {
            store.delete(session_id).await?;
            tracing::info!(session_id = %session_id, "session history cleared");
        }
        Ok(())
    }

    async fn run_turn(
        &self,
        request: TurnRequest,
        streaming: Option<Streaming<'_>>,
    ) -> Result<TurnOutcome, TurnFailure> {
        let session_id = request.session_id.clone();
        let fail = |stage: Stage, error: AgentError| TurnFailure {
            session_id: session_id.clone(),
            stage,
            error,
        };

        if request.session_id.trim().is_empty() {
            return Err(fail(
                Stage::Brain,
                AgentError::InvalidRequest("session_id is required".into()),
            ));
        }

        let mut state = self.load_state(&request.session_id).await;
        let incoming = new_messages(&state.messages, request.messages);
        if incoming.is_empty() {
            return Err(fail(
                Stage::Brain,
                AgentError::InvalidRequest("no new messages in request".into()),
            ));
        }

        state.begin_turn();
        state.user_id = request.user_id;
        state.access_token = request.access_token;
        if request.profile.is_some() {
            state.profile = request.profile;
        }
        if request.primary_archetype.is_some() {
            state.primary_archetype = request.primary_archetype;
        }
        if request.secondary_archetype.is_some() {
            state.secondary_archetype = request.secondary_archetype;
        }
        let turn_start = state.messages.len();
        state.apply(StageUpdate::messages(incoming));

        tracing::info!(
            session_id = %state.session_id,
            has_user_id = state.user_id.is_some(),
            access_token_len = state.credential_len(),
            history_len = state.messages.len(),
            "turn started"
        );

        let tx = streaming.as_ref().map(|s| s.tx);
        let mut stage = Stage::Brain;
        loop {
            if let Some(s) = &streaming {
                if s.cancel.is_cancelled()
                    || !send_event(tx, TurnEvent::StageEntered { stage })
                {
                    self.checkpoint(&state).await;
                    tracing::info!(session_id = %state.session_id, stage = %stage, "turn cancelled");
                    return Err(fail(stage, AgentError::Cancelled));
                }
            }

            let result = match stage {
                Stage::Brain => self.brain_step(&mut state, tx).await,
                Stage::ContextGathering => {
                    self.context_step(&mut state, tx).await;
                    Ok(Stage::Brain)
                }
                Stage::Synthesizer => {
                    let update = match &streaming {
                        Some(s) => {
                            self.synthesizer
                                .run_streaming(&state, Some(s.tx), s.cancel)
                                .await
                        }
                        None => self.synthesizer.run(&state).await,
                    };
                    update.map(|u| {
                        state.apply(u);
                        Stage::End
                    })
                }
                Stage::End => break,
            };

            match result {
                Ok(next) => {
                    self.checkpoint(&state).await;
                    stage = next;
                }
                Err(error) => {
                    self.checkpoint(&state).await;
                    if !matches!(error, AgentError::Cancelled) {
                        tracing::error!(
                            session_id = %state.session_id,
                            user_id = ?state.user_id,
                            stage = %stage,
                            error = %error,
                            source = ?std::error::Error::source(&error).map(|s| s.to_string()),
                            "turn failed"
                        );
                    }
                    return Err(fail(stage, error));
                }
            }
        }

        let payload = extract_notification_payload(&state.messages[turn_start..]);
        let messages = filter_for_caller(&state.messages);
        tracing::info!(
            session_id = %state.session_id,
            tool_cycles = state.tool_cycles,
            has_payload = payload.is_some(),
            "turn completed"
        );
        send_event(
            tx,
            TurnEvent::Done {
                payload: payload.clone(),
            },
        );
        Ok(TurnOutcome { messages, payload })
    }

    async fn brain_step(
        &self,
        state: &mut TurnState,
        tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<Stage, AgentError> {
        let update = self.brain.run(state, self.dispatcher.registry()).await?;
        state.apply(update);

        let next = route_after_brain(
            state.brain_decision.as_ref(),
            state.last_message(),
            state.needs_context,
        );
        let next = enforce_cycle_limit(next, state.tool_cycles, self.max_tool_cycles);

        if next == Stage::End {
            if let Some(text) = state
                .brain_decision
                .as_ref()
                .and_then(|d| d.direct_response())
            {
                send_event(tx, TurnEvent::Token { text: text.to_string() });
            }
        }
        tracing::info!(session_id = %state.session_id, next = %next, "routed");
        Ok(next)
    }

    async fn context_step(&self, state: &mut TurnState, tx: Option<&UnboundedSender<TurnEvent>>) {
        let calls = state.pending_tool_calls().to_vec();
        for call in &calls {
            send_event(
                tx,
                TurnEvent::ToolCall {
                    tool: call.tool.clone(),
                    args: call.args.clone(),
                },
            );
        }

        let results = {
            let ctx = DispatchContext {
                session_id: &state.session_id,
                user_id: state.user_id.as_deref(),
                access_token: state.access_token.as_ref(),
            };
            self.dispatcher.dispatch_all(&calls, &ctx).await
        };

        for result in &results {
            send_event(
                tx,
                TurnEvent::Observation {
                    tool: result.name.clone().unwrap_or_default(),
                    preview: preview(&result.content),
                },
            );
        }
        state.apply(StageUpdate::messages(results));
        state.tool_cycles += 1;
    }

    async fn load_state(&self, session_id: &str) -> TurnState {
        let Some(store) = &self.checkpoints else {
            return TurnState::new(session_id);
        };
        match store.get(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => TurnState::new(session_id),
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "checkpoint read failed, starting fresh");
                TurnState::new(session_id)
            }
        }
    }

    async fn checkpoint(&self, state: &TurnState) {
        if let Some(store) = &self.checkpoints {
            if let Err(e) = store.put(&state.session_id, state).await {
                tracing::error!(session_id = %state.session_id, error = %e, "checkpoint write failed");
            }
        }
    }
}

/// 调用方若回传了完整的可见历史，只取其后的新消息
fn new_messages(stored: &[Message], incoming: Vec<Message>) -> Vec<Message> {
    let visible = filter_for_caller(stored);
    if visible.is_empty() || incoming.len() < visible.len() {
        return incoming;
    }
    let echoed = visible
        .iter()
        .zip(incoming.iter())
        .all(|(a, b)| a.role == b.role && a.content == b.content);
    if echoed {
        incoming.into_iter().skip(visible.len()).collect()
    } else {
        incoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echoed_prefix_is_skipped() {
        let stored = vec![
            Message::user("hi"),
            Message::tool_calls(vec![]),
            Message::assistant("hello"),
        ];
        let incoming = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("next"),
        ];
        let fresh = new_messages(&stored, incoming);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].content, "next");
    }

    #[test]
    fn test_repeated_text_is_not_mistaken_for_echo() {
        let stored = vec![Message::user("hi"), Message::assistant("hello")];
        let fresh = new_messages(&stored, vec![Message::user("hi")]);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_failure_display_is_generic() {
        let failure = TurnFailure {
            session_id: "s1".into(),
            stage: Stage::Synthesizer,
            error: AgentError::InvalidRequest("db password wrong".into()),
        };
        assert_eq!(failure.to_string(), GENERIC_ERROR_MESSAGE);
        assert!(!failure.to_string().contains("password"));
    }
}
