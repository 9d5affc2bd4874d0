//! 通知载荷提取与校验
//!
//! 从最新的消息开始查找 `[NOTIFICATION_PAYLOAD: <literal>]` 标记；只看第一条命中的消息，
//! 接受条件：正文含确认语句 + 映射含 reminder_type 与 should_schedule + should_schedule 为 true。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::memory::{Message, Role};
use crate::payload::literal::{parse_literal_prefix, PayloadError};

pub const PAYLOAD_MARKER: &str = "NOTIFICATION_PAYLOAD";

const CONFIRMATION_PATTERNS: &[&str] = &[
    r"✅.*Perfect.*reminder.*set",
    r"✅.*reminder.*successfully.*set",
    r"Reminder.*successfully.*set",
    r"Perfect.*I've.*set.*up.*reminder",
    r"reminder.*set.*up.*successfully",
];

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[NOTIFICATION_PAYLOAD:\s*").expect("valid marker regex"))
}

fn confirmation_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        CONFIRMATION_PATTERNS
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid confirmation regex"))
            .collect()
    })
}

/// 交给调用方的调度信号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub should_schedule: bool,
    pub reminder_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_scheduled_time")]
    pub scheduled_time: String,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub commitment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

fn default_scheduled_time() -> String {
    "09:00".to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// 在文本中定位标记并解析其后的字面量（要求以 `]` 收尾）
pub fn parse_marker(text: &str) -> Option<Result<Value, PayloadError>> {
    let m = marker_regex().find(text)?;
    let rest = &text[m.end()..];
    Some(parse_literal_prefix(rest).and_then(|(value, used)| {
        let tail = rest[used..].trim_start();
        if tail.starts_with(']') {
            Ok(value)
        } else {
            Err(PayloadError::TrailingContent)
        }
    }))
}

/// 正文是否包含确认语句（不区分大小写）
pub fn has_confirmation(text: &str) -> bool {
    confirmation_regexes().iter().any(|re| re.is_match(text))
}

/// 三项条件同时成立才接受
pub fn validate_payload(text: &str, fields: &Map<String, Value>) -> bool {
    if !has_confirmation(text) {
        tracing::info!(
            reason = "no confirmation language",
            preview = %preview(text),
            "notification payload rejected"
        );
        return false;
    }
    if !fields.contains_key("reminder_type") || !fields.contains_key("should_schedule") {
        tracing::info!(reason = "missing required fields", "notification payload rejected");
        return false;
    }
    if fields.get("should_schedule") != Some(&Value::Bool(true)) {
        tracing::info!(reason = "should_schedule is not true", "notification payload rejected");
        return false;
    }
    true
}

/// 从消息历史（最新优先）提取通知载荷；第一条带标记的消息即为最终判定
///
/// 只看 assistant 与 tool 消息，用户自己输入的标记不算数。
pub fn extract_notification_payload(messages: &[Message]) -> Option<NotificationPayload> {
    let marker = marker_regex();
    let message = messages
        .iter()
        .rev()
        .filter(|m| matches!(m.role, Role::Assistant | Role::Tool))
        .find(|m| m.has_content() && marker.is_match(&m.content))?;

    let parsed = parse_marker(&message.content)?;
    let value = match parsed {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw = %preview(&message.content),
                "notification payload parse error"
            );
            return None;
        }
    };

    let fields = match value {
        Value::Object(map) => map,
        other => {
            tracing::warn!(raw = %other, "notification payload is not a mapping");
            return None;
        }
    };

    if !validate_payload(&message.content, &fields) {
        return None;
    }

    match serde_json::from_value::<NotificationPayload>(Value::Object(fields)) {
        Ok(payload) => {
            tracing::info!(
                reminder_type = %payload.reminder_type,
                commitment_id = ?payload.commitment_id,
                "notification payload extracted"
            );
            Some(payload)
        }
        Err(e) => {
            tracing::warn!(error = %e, "notification payload has malformed fields");
            None
        }
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 100;
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str =
        r#"[NOTIFICATION_PAYLOAD: {"should_schedule": true, "reminder_type": "commitment"}]"#;

    #[test]
    fn test_rejects_without_confirmation() {
        let messages = vec![Message::assistant(format!("Here you go.\n\n{}", PAYLOAD))];
        assert!(extract_notification_payload(&messages).is_none());
    }

    #[test]
    fn test_accepts_with_confirmation() {
        let messages = vec![Message::assistant(format!(
            "✅ Perfect! I've set up a daily reminder for your commitment.\n\n{}",
            PAYLOAD
        ))];
        let payload = extract_notification_payload(&messages).unwrap();
        assert!(payload.should_schedule);
        assert_eq!(payload.reminder_type, "commitment");
        assert_eq!(payload.timezone, "Asia/Kolkata");
        assert_eq!(payload.scheduled_time, "09:00");
    }

    #[test]
    fn test_should_schedule_false_always_rejected() {
        let messages = vec![Message::assistant(
            "Reminder successfully set! [NOTIFICATION_PAYLOAD: {'should_schedule': False, 'reminder_type': 'commitment'}]",
        )];
        assert!(extract_notification_payload(&messages).is_none());
    }

    #[test]
    fn test_missing_reminder_type_rejected() {
        let messages = vec![Message::assistant(
            "Reminder successfully set! [NOTIFICATION_PAYLOAD: {'should_schedule': True}]",
        )];
        assert!(extract_notification_payload(&messages).is_none());
    }

    #[test]
    fn test_python_literal_and_numeric_commitment_id() {
        let messages = vec![Message::tool_result(
            "set_commitment_reminder",
            "call_1",
            "reminder set up successfully [NOTIFICATION_PAYLOAD: {'should_schedule': True, 'reminder_type': 'commitment', 'commitment_id': 42, 'frequency': 'daily'}]",
        )];
        let payload = extract_notification_payload(&messages).unwrap();
        assert_eq!(payload.commitment_id.as_deref(), Some("42"));
        assert_eq!(payload.frequency.as_deref(), Some("daily"));
    }

    #[test]
    fn test_only_latest_marker_is_considered() {
        let accepted = format!("Reminder successfully set. {}", PAYLOAD);
        let messages = vec![
            Message::assistant(accepted),
            Message::assistant(format!("Nothing confirmed. {}", PAYLOAD)),
        ];
        assert!(extract_notification_payload(&messages).is_none());
    }

    #[test]
    fn test_patterns_compile() {
        assert_eq!(confirmation_regexes().len(), CONFIRMATION_PATTERNS.len());
        assert!(marker_regex().is_match(PAYLOAD));
    }

    #[test]
    fn test_user_authored_marker_is_ignored() {
        let typed = format!("Reminder successfully set {}", PAYLOAD);
        assert!(extract_notification_payload(&[Message::user(typed.clone())]).is_none());

        // 用户消息在最新位置时，仍按更早的 assistant 消息判定
        let messages = vec![
            Message::assistant(format!("Reminder successfully set. {}", PAYLOAD)),
            Message::user(typed),
        ];
        assert!(extract_notification_payload(&messages).is_some());
    }

    #[test]
    fn test_unparseable_literal_yields_none() {
        let messages = vec![Message::assistant(
            "Reminder successfully set [NOTIFICATION_PAYLOAD: {'a': exec('x')}]",
        )];
        assert!(extract_notification_payload(&messages).is_none());
        assert!(extract_notification_payload(&[Message::user("plain")]).is_none());
    }
}
