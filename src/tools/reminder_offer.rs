//! 承诺提醒：创建承诺后主动询问、设置（附带通知载荷）、拒绝
//!
//! set_commitment_reminder 成功时在文本末尾追加 `[NOTIFICATION_PAYLOAD: {...}]`，
//! 并带上确认语句，供回合结束时的载荷提取器识别。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::payload::{NotificationPayload, PAYLOAD_MARKER};
use crate::tools::registry::Caller;
use crate::tools::schema::{params_schema, parse_params};
use crate::tools::store::{NewReminder, RecordStore};
use crate::tools::validation::{normalize_frequency, today, validate_reminder_data};
use crate::tools::{Tool, ToolError};

pub const REMINDER_TIMEZONE: &str = "Asia/Kolkata";
pub const REMINDER_TIME: &str = "09:00";

fn require_non_empty(value: &str, what: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        Err(ToolError::Rejected(format!(
            "Error: {} is required and cannot be empty",
            what
        )))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OfferReminderParams {
    /// 承诺内容（用于提示语）
    commitment_text: String,
    /// 承诺 ID
    commitment_id: String,
}

/// 创建承诺后询问是否设置提醒
pub struct OfferReminderTool;

#[async_trait]
impl Tool for OfferReminderTool {
    fn name(&self) -> &str {
        "offer_commitment_reminder"
    }

    fn description(&self) -> &str {
        "After a commitment is created, offer the user reminder options (daily, weekly, fortnightly, monthly or a specific date)."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<OfferReminderParams>()
    }

    fn requires_identity(&self) -> bool {
        true
    }

    fn session_scoped(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let params: OfferReminderParams = parse_params(&args)?;
        require_non_empty(&params.commitment_text, "Commitment text")?;
        require_non_empty(&params.commitment_id, "Commitment ID")?;

        tracing::info!(
            user_id = %caller.user_id,
            commitment_id = %params.commitment_id,
            "reminder offer initiated"
        );

        Ok(format!(
            "Great! Your commitment is set: \"{}\"\n\n\
Would you like me to set up a reminder to help you stay on track? I can remind you:\n\n\
1. **Daily** - Every day at 9 AM\n\
2. **Weekly** - Every week on a specific day at 9 AM\n\
3. **Fortnightly** - Every two weeks at 9 AM\n\
4. **Monthly** - Every month at 9 AM\n\
5. **Specific date** - On a particular date at 9 AM\n\n\
All reminders will be sent at 9 AM India time. What would work best for you?\n\n\
Or say \"no reminder\" if you prefer to track it yourself.",
            params.commitment_text.trim()
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SetCommitmentReminderParams {
    /// "frequency" 或 "date"
    reminder_type: String,
    /// 承诺 ID
    commitment_id: String,
    /// reminder_type 为 frequency 时必填
    #[serde(default)]
    frequency: Option<String>,
    /// reminder_type 为 date 时必填（YYYY-MM-DD）
    #[serde(default)]
    date: Option<String>,
}

/// 为承诺设置提醒，并生成给调用方的通知载荷
pub struct SetCommitmentReminderTool {
    store: Arc<dyn RecordStore>,
}

impl SetCommitmentReminderTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetCommitmentReminderTool {
    fn name(&self) -> &str {
        "set_commitment_reminder"
    }

    fn description(&self) -> &str {
        "Set a reminder for a commitment (reminder_type 'frequency' with frequency, or 'date' with YYYY-MM-DD) and schedule a device notification."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<SetCommitmentReminderParams>()
    }

    fn requires_identity(&self) -> bool {
        true
    }

    fn session_scoped(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let params: SetCommitmentReminderParams = parse_params(&args)?;
        require_non_empty(&params.reminder_type, "Reminder type")?;
        require_non_empty(&params.commitment_id, "Commitment ID")?;
        let commitment_id = params.commitment_id.trim().to_string();

        let (frequency, date) = match params.reminder_type.trim() {
            "frequency" => match params.frequency.as_deref().filter(|f| !f.trim().is_empty()) {
                Some(f) => (Some(normalize_frequency(f)), None),
                None => {
                    return Err(ToolError::Rejected(
                        "Error: Frequency is required when reminder_type is 'frequency'".into(),
                    ))
                }
            },
            "date" => match params.date.as_deref().filter(|d| !d.trim().is_empty()) {
                Some(d) => (None, Some(d.trim().to_string())),
                None => {
                    return Err(ToolError::Rejected(
                        "Error: Date is required when reminder_type is 'date'".into(),
                    ))
                }
            },
            _ => {
                return Err(ToolError::Rejected(
                    "Error: Reminder type must be either 'frequency' or 'date'".into(),
                ))
            }
        };

        validate_reminder_data(frequency.as_deref(), date.as_deref(), today())
            .map_err(|e| ToolError::Rejected(format!("Error: {}", e)))?;

        let record = self
            .store
            .insert_reminder(
                &caller.user_id,
                NewReminder {
                    frequency: frequency.clone(),
                    date: date.clone(),
                    chat_id: caller.chat_id.clone(),
                    commitment_id: Some(commitment_id.clone()),
                },
            )
            .await?;
        if !self
            .store
            .mark_commitment_reminder(&caller.user_id, &commitment_id)
            .await?
        {
            tracing::warn!(
                user_id = %caller.user_id,
                commitment_id = %commitment_id,
                "reminder set for unknown commitment"
            );
        }

        let payload = NotificationPayload {
            should_schedule: true,
            reminder_type: "commitment".into(),
            frequency: frequency.clone(),
            date: date.clone(),
            timezone: REMINDER_TIMEZONE.into(),
            scheduled_time: REMINDER_TIME.into(),
            commitment_id: Some(commitment_id.clone()),
            message: Some("Time to work on your commitment!".into()),
        };
        let payload_json =
            serde_json::to_string(&payload).map_err(|e| ToolError::Internal(e.to_string()))?;

        tracing::info!(
            user_id = %caller.user_id,
            commitment_id = %commitment_id,
            reminder_id = %record.id,
            frequency = ?frequency,
            date = ?date,
            "commitment reminder set"
        );

        let mut msg = match (&frequency, &date) {
            (Some(f), _) => format!(
                "✅ Perfect! I've set up a {} reminder for your commitment at 9 AM India time.",
                f
            ),
            (_, Some(d)) => format!(
                "✅ Perfect! I've set up a reminder for {} at 9 AM India time for your commitment.",
                d
            ),
            (None, None) => {
                return Err(ToolError::Internal("reminder without frequency or date".into()))
            }
        };
        msg.push_str("\n\nNotification scheduled - you'll receive reminders on your device to help you stay committed!");
        msg.push_str(&format!("\n\n[{}: {}]", PAYLOAD_MARKER, payload_json));
        Ok(msg)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DeclineReminderParams {
    /// 承诺 ID
    commitment_id: String,
}

/// 用户拒绝设置提醒
pub struct DeclineReminderTool;

#[async_trait]
impl Tool for DeclineReminderTool {
    fn name(&self) -> &str {
        "decline_commitment_reminder"
    }

    fn description(&self) -> &str {
        "Acknowledge that the user does not want a reminder for a commitment."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<DeclineReminderParams>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let params: DeclineReminderParams = parse_params(&args)?;
        require_non_empty(&params.commitment_id, "Commitment ID")?;
        tracing::info!(commitment_id = %params.commitment_id, "commitment reminder declined");
        Ok("No problem! You can always set up a reminder later if you change your mind. Your commitment is saved and ready to track on your home screen.".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use crate::payload::extract_notification_payload;
    use crate::tools::store::MemoryRecordStore;

    fn args(extra: Value) -> Value {
        let mut args = serde_json::json!({"user_id": "u1", "access_token": "t", "chat_id": "s1"});
        if let (Some(map), Value::Object(more)) = (args.as_object_mut(), extra) {
            map.extend(more);
        }
        args
    }

    #[tokio::test]
    async fn test_frequency_reminder_emits_valid_payload() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let c = store.insert_commitment("u1", "meditate", None, false).await.unwrap();
        let tool = SetCommitmentReminderTool::new(store.clone());
        let out = tool
            .execute(args(serde_json::json!({
                "reminder_type": "frequency",
                "commitment_id": c.id,
                "frequency": "every day"
            })))
            .await
            .unwrap();
        assert!(out.starts_with("✅ Perfect! I've set up a daily reminder"));

        let payload =
            extract_notification_payload(&[Message::tool_result("set_commitment_reminder", "c1", out)])
                .unwrap();
        assert!(payload.should_schedule);
        assert_eq!(payload.reminder_type, "commitment");
        assert_eq!(payload.frequency.as_deref(), Some("daily"));
        assert!(payload.date.is_none());
        assert_eq!(payload.commitment_id.as_deref(), Some(c.id.as_str()));

        assert!(store.list_commitments("u1").await.unwrap()[0].reminder_set);
    }

    #[tokio::test]
    async fn test_invalid_requests_have_no_payload() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let tool = SetCommitmentReminderTool::new(store);
        let err = tool
            .execute(args(serde_json::json!({"reminder_type": "hourly", "commitment_id": "c1"})))
            .await
            .unwrap_err();
        assert!(err.user_message("x").contains("either 'frequency' or 'date'"));

        let err = tool
            .execute(args(serde_json::json!({"reminder_type": "date", "commitment_id": "c1", "date": "2000-01-01"})))
            .await
            .unwrap_err();
        assert!(err.user_message("x").contains("in the past"));

        let err = tool
            .execute(args(serde_json::json!({"reminder_type": "frequency", "commitment_id": "c1"})))
            .await
            .unwrap_err();
        assert!(err.user_message("x").contains("Frequency is required"));
    }

    #[tokio::test]
    async fn test_offer_and_decline() {
        let offer = OfferReminderTool
            .execute(args(serde_json::json!({"commitment_text": "read", "commitment_id": "c1"})))
            .await
            .unwrap();
        assert!(offer.contains("\"read\""));
        assert!(offer.contains("9 AM India time"));

        let declined = DeclineReminderTool
            .execute(serde_json::json!({"commitment_id": "c1"}))
            .await
            .unwrap();
        assert!(declined.starts_with("No problem!"));
    }
}
