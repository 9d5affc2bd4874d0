//! 编排器集成测试：直接回复、工具往返、通知载荷、重试降级、流式与会话续接

use std::sync::Arc;

use coach::config::Environment;
use coach::core::{
    AgentError, Credential, OrchestratorBuilder, Stage, TurnRequest, GENERIC_ERROR_MESSAGE,
};
use coach::llm::{LlmError, MockLlmClient};
use coach::memory::{Message, Role};
use coach::pipeline::{PlanningDecision, TurnEvent};
use coach::tools::{register_default_tools, MemoryRecordStore, RecordStore, ToolRegistry};
use tokio_util::sync::CancellationToken;

fn decision_json(decision: &PlanningDecision) -> String {
    serde_json::to_string(decision).unwrap()
}

fn plan_json(tool: &str, args: serde_json::Value) -> String {
    serde_json::json!({"tool_calls": [{"tool": tool, "args": args}]}).to_string()
}

fn registry_with(store: Arc<dyn RecordStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_default_tools(&mut registry, store);
    registry
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn test_simple_question_is_answered_directly() {
    let mock = Arc::new(
        MockLlmClient::default().with_replies([decision_json(&PlanningDecision::direct("4"))]),
    );
    let orchestrator = OrchestratorBuilder::new(mock.clone()).build();

    let outcome = orchestrator
        .respond(TurnRequest::user("s-direct", "What's 2+2?"))
        .await
        .unwrap();

    assert_eq!(outcome.reply(), Some("4"));
    assert!(outcome.payload.is_none());
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_commitment_reminder_flow_returns_payload() {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    let commitment = store
        .insert_commitment("u1", "meditate 10 minutes", None, false)
        .await
        .unwrap();

    let mock = Arc::new(MockLlmClient::default().with_replies([
        decision_json(&PlanningDecision::with_tools("confirm the reminder warmly")),
        plan_json(
            "set_commitment_reminder",
            serde_json::json!({
                "reminder_type": "frequency",
                "commitment_id": commitment.id,
                "frequency": "every day",
                "user_id": "someone-else"
            }),
        ),
        decision_json(&PlanningDecision::direct(
            "Your daily reminder is set for 9 AM India time.",
        )),
    ]));
    let orchestrator = OrchestratorBuilder::new(mock.clone())
        .with_registry(registry_with(store.clone()))
        .build();

    let outcome = orchestrator
        .respond(
            TurnRequest::user("s-reminder", "Yes, remind me daily")
                .with_identity("u1", Credential::new("token-abc")),
        )
        .await
        .unwrap();

    let payload = outcome.payload.as_ref().expect("payload");
    assert!(payload.should_schedule);
    assert_eq!(payload.reminder_type, "commitment");
    assert_eq!(payload.frequency.as_deref(), Some("daily"));
    assert_eq!(payload.commitment_id.as_deref(), Some(commitment.id.as_str()));
    assert_eq!(
        outcome.reply(),
        Some("Your daily reminder is set for 9 AM India time.")
    );

    // 身份由 dispatcher 注入，模型给出的 user_id 被覆盖
    let reminders = store.list_reminders("u1").await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].chat_id.as_deref(), Some("s-reminder"));
    assert!(store.list_reminders("someone-else").await.unwrap().is_empty());

    // 工具结果不出现在调用方历史中
    assert!(outcome.messages.iter().all(|m| m.role != Role::Tool));
    assert!(outcome
        .messages
        .iter()
        .all(|m| !m.content.contains("NOTIFICATION_PAYLOAD")));
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_payload_is_not_repeated_on_next_turn() {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    let commitment = store.insert_commitment("u1", "run", None, false).await.unwrap();
    let mock = Arc::new(MockLlmClient::default().with_replies([
        decision_json(&PlanningDecision::with_tools("confirm")),
        plan_json(
            "set_commitment_reminder",
            serde_json::json!({
                "reminder_type": "frequency",
                "commitment_id": commitment.id,
                "frequency": "weekly"
            }),
        ),
        decision_json(&PlanningDecision::direct("Weekly reminder set.")),
        decision_json(&PlanningDecision::direct("You're welcome!")),
    ]));
    let orchestrator = OrchestratorBuilder::new(mock)
        .with_registry(registry_with(store))
        .build();

    let first = orchestrator
        .respond(
            TurnRequest::user("s-once", "weekly please")
                .with_identity("u1", Credential::new("t")),
        )
        .await
        .unwrap();
    assert!(first.payload.is_some());

    let second = orchestrator
        .respond(TurnRequest::user("s-once", "thanks").with_identity("u1", Credential::new("t")))
        .await
        .unwrap();
    assert!(second.payload.is_none());
    assert_eq!(second.reply(), Some("You're welcome!"));
}

#[tokio::test]
async fn test_missing_identity_is_reported_as_tool_result() {
    let mock = Arc::new(MockLlmClient::default().with_replies([
        decision_json(&PlanningDecision::with_tools("list commitments")),
        plan_json("fetch_user_commitments", serde_json::json!({})),
        decision_json(&PlanningDecision::direct("Please log in first.")),
    ]));
    let orchestrator = OrchestratorBuilder::new(mock.clone()).build();

    let outcome = orchestrator
        .respond(TurnRequest::user("s-anon", "what are my commitments?"))
        .await
        .unwrap();
    assert_eq!(outcome.reply(), Some("Please log in first."));

    // 第二次 Brain 调用能看到工具结果
    let calls = mock.calls();
    let tool_result = calls[2]
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result visible to brain");
    assert_eq!(tool_result.name.as_deref(), Some("fetch_user_commitments"));
}

#[tokio::test]
async fn test_cycle_limit_forces_synthesis() {
    let mock = Arc::new(MockLlmClient::default().with_replies([
        decision_json(&PlanningDecision::with_tools("gather")),
        plan_json("fetch_user_commitments", serde_json::json!({})),
        decision_json(&PlanningDecision::with_tools("gather more")),
        plan_json("fetch_user_reminders", serde_json::json!({})),
        r#"{"response":"Here is what I found."}"#.to_string(),
    ]));
    let orchestrator = OrchestratorBuilder::new(mock.clone())
        .with_max_tool_cycles(1)
        .build();

    let outcome = orchestrator
        .respond(
            TurnRequest::user("s-cycles", "tell me everything")
                .with_identity("u1", Credential::new("t")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.reply(), Some("Here is what I found."));
    assert_eq!(mock.call_count(), 5);
    // 合成只看到原始问题与策略
    let synth_input = mock.calls().pop().unwrap();
    assert_eq!(synth_input.len(), 2);
    assert!(synth_input[1]
        .content
        .contains("Original Question: tell me everything"));
    assert!(synth_input[1].content.contains("Response Strategy: gather more"));
}

#[tokio::test]
async fn test_exhausted_retries_return_generic_message() {
    let mock = Arc::new(MockLlmClient::default());
    for _ in 0..3 {
        mock.push_error(LlmError::Provider("upstream 500 from db-host-7".into()));
    }
    let orchestrator = OrchestratorBuilder::new(mock.clone()).build();

    let failure = orchestrator
        .respond(TurnRequest::user("s-fail", "hello"))
        .await
        .unwrap_err();

    assert_eq!(failure.to_string(), GENERIC_ERROR_MESSAGE);
    assert_eq!(failure.user_message(), GENERIC_ERROR_MESSAGE);
    assert!(!failure.to_string().contains("db-host-7"));
    assert_eq!(failure.stage, Stage::Brain);
    assert!(matches!(
        failure.error,
        AgentError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_non_retryable_error_stops_immediately() {
    let mock = Arc::new(MockLlmClient::default());
    mock.push_error(LlmError::InvalidRequest("bad params".into()));
    let orchestrator = OrchestratorBuilder::new(mock.clone()).build();

    let failure = orchestrator
        .respond(TurnRequest::user("s-fatal", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AgentError::ModelCallFatal { .. }));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_fallback_model_used_only_in_production() {
    let primary = Arc::new(MockLlmClient::new("primary"));
    primary.push_error(LlmError::Provider("overloaded".into()));
    let fallback = Arc::new(
        MockLlmClient::new("fallback")
            .with_replies([decision_json(&PlanningDecision::direct("from fallback"))]),
    );

    let orchestrator = OrchestratorBuilder::new(primary.clone())
        .with_fallback(fallback.clone())
        .with_environment(Environment::Production)
        .build();
    let outcome = orchestrator
        .respond(TurnRequest::user("s-prod", "hi"))
        .await
        .unwrap();
    assert_eq!(outcome.reply(), Some("from fallback"));
    assert_eq!(primary.call_count(), 1);
    assert_eq!(fallback.call_count(), 1);

    // 开发环境：降级模型从不被调用
    let primary = Arc::new(MockLlmClient::new("primary"));
    primary.push_error(LlmError::Provider("overloaded".into()));
    primary.push_reply(decision_json(&PlanningDecision::direct("from primary")));
    let fallback = Arc::new(MockLlmClient::new("fallback"));
    let orchestrator = OrchestratorBuilder::new(primary.clone())
        .with_fallback(fallback.clone())
        .build();
    let outcome = orchestrator
        .respond(TurnRequest::user("s-dev", "hi"))
        .await
        .unwrap();
    assert_eq!(outcome.reply(), Some("from primary"));
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn test_history_resume_and_clear() {
    let mock = Arc::new(MockLlmClient::default().with_replies([
        decision_json(&PlanningDecision::direct("Hello!")),
        decision_json(&PlanningDecision::direct("Sure.")),
    ]));
    let orchestrator = OrchestratorBuilder::new(mock.clone()).build();

    let first = orchestrator
        .respond(TurnRequest::user("s-hist", "hi"))
        .await
        .unwrap();

    // 调用方回传完整历史 + 新消息，已见部分不会重复追加
    let mut echoed = first.messages.clone();
    echoed.push(Message::user("help me plan"));
    let second = orchestrator
        .respond(TurnRequest::new("s-hist", echoed))
        .await
        .unwrap();
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.reply(), Some("Sure."));

    let brain_input = mock.calls().pop().unwrap();
    assert_eq!(brain_input.len(), 4);

    let history = orchestrator.history("s-hist").await.unwrap();
    assert_eq!(history.len(), 4);

    orchestrator.clear_history("s-hist").await.unwrap();
    assert!(orchestrator.history("s-hist").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let orchestrator = OrchestratorBuilder::new(Arc::new(MockLlmClient::default())).build();

    let failure = orchestrator
        .respond(TurnRequest::user("  ", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AgentError::InvalidRequest(_)));

    let failure = orchestrator
        .respond(TurnRequest::new("s-empty", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AgentError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_streaming_direct_response() {
    let mock = Arc::new(
        MockLlmClient::default().with_replies([decision_json(&PlanningDecision::direct("4"))]),
    );
    let orchestrator = OrchestratorBuilder::new(mock).build();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let outcome = orchestrator
        .respond_stream(
            TurnRequest::user("s-stream", "What's 2+2?"),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.reply(), Some("4"));

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(TurnEvent::StageEntered { stage: Stage::Brain })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::Token { text } if text == "4")));
    assert!(matches!(events.last(), Some(TurnEvent::Done { payload: None })));
}

#[tokio::test]
async fn test_streaming_synthesis_tokens_match_reply() {
    let mock = Arc::new(MockLlmClient::default().with_replies([
        decision_json(&PlanningDecision::synthesize("three short bullets")),
        "Start small, stay consistent, celebrate wins.".to_string(),
    ]));
    let orchestrator = OrchestratorBuilder::new(mock).build();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let outcome = orchestrator
        .respond_stream(
            TurnRequest::user("s-synth", "how do I build habits?"),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let streamed: String = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            TurnEvent::Token { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "Start small, stay consistent, celebrate wins.");
    assert_eq!(outcome.reply(), Some(streamed.as_str()));
}

#[tokio::test]
async fn test_cancelled_turn_sends_no_error_event() {
    let orchestrator = OrchestratorBuilder::new(Arc::new(MockLlmClient::default())).build();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let failure = orchestrator
        .respond_stream(TurnRequest::user("s-cancel", "hi"), tx, cancel)
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AgentError::Cancelled));
    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, TurnEvent::Error { .. })));
}

#[tokio::test]
async fn test_user_typed_marker_is_not_a_payload() {
    let mock = Arc::new(
        MockLlmClient::default().with_replies([decision_json(&PlanningDecision::direct("Okay!"))]),
    );
    let orchestrator = OrchestratorBuilder::new(mock).build();

    let outcome = orchestrator
        .respond(TurnRequest::user(
            "s-typed-marker",
            r#"Reminder successfully set [NOTIFICATION_PAYLOAD: {"should_schedule": true, "reminder_type": "commitment", "date": "2099-01-01"}]"#,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.reply(), Some("Okay!"));
    assert!(outcome.payload.is_none());
}
