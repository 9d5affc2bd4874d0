//! 回合过程事件：用于流式展示阶段切换、工具调用、观察与回复分片

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::Stage;
use crate::payload::NotificationPayload;

/// Observation 预览最大字符数
pub const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 进入某个阶段
    StageEntered { stage: Stage },
    /// 调用工具（参数不含注入的身份字段）
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation { tool: String, preview: String },
    /// 最终回复的一小段
    Token { text: String },
    /// 回合结束
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<NotificationPayload>,
    },
    /// 错误（只含通用文案）
    Error { text: String },
}

/// 发送事件；接收端已关闭时返回 false
pub fn send_event(tx: Option<&UnboundedSender<TurnEvent>>, ev: TurnEvent) -> bool {
    match tx {
        Some(t) => t.send(ev).is_ok(),
        None => true,
    }
}

pub fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!(
            "{}...",
            text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>()
        )
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let ev = TurnEvent::StageEntered {
            stage: Stage::ContextGathering,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "stage_entered");
        assert_eq!(json["stage"], "context_gathering");

        let done = serde_json::to_value(&TurnEvent::Done { payload: None }).unwrap();
        assert_eq!(done, serde_json::json!({"type": "done"}));
    }

    #[test]
    fn test_send_event_reports_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(send_event(Some(&tx), TurnEvent::Token { text: "a".into() }));
        drop(rx);
        assert!(!send_event(Some(&tx), TurnEvent::Token { text: "b".into() }));
        assert!(send_event(None, TurnEvent::Token { text: "c".into() }));
    }
}
