//! 提醒工具：查询、设置、更新

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::registry::Caller;
use crate::tools::schema::{params_schema, parse_params};
use crate::tools::store::{NewReminder, RecordStore};
use crate::tools::validation::{
    normalize_frequency, today, validate_date, validate_frequency, validate_reminder_data,
};
use crate::tools::{Tool, ToolError};

/// 查询当前用户的提醒
pub struct FetchRemindersTool {
    store: Arc<dyn RecordStore>,
}

impl FetchRemindersTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FetchRemindersTool {
    fn name(&self) -> &str {
        "fetch_user_reminders"
    }

    fn description(&self) -> &str {
        "Fetch all reminders of the current user with frequency, date and creation time."
    }

    fn requires_identity(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let reminders = self.store.list_reminders(&caller.user_id).await?;
        let out = serde_json::json!({
            "user_id": caller.user_id,
            "total_reminders": reminders.len(),
            "reminders": reminders,
        });
        serde_json::to_string_pretty(&out).map_err(|e| ToolError::Internal(e.to_string()))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SetReminderParams {
    /// daily / weekly / fortnightly / monthly
    #[serde(default)]
    frequency: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    date: Option<String>,
}

/// 设置提醒（频率与日期二选一）
pub struct SetReminderTool {
    store: Arc<dyn RecordStore>,
}

impl SetReminderTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetReminderTool {
    fn name(&self) -> &str {
        "set_user_reminder"
    }

    fn description(&self) -> &str {
        "Set a reminder for the current user, either recurring (frequency) or on a specific date (YYYY-MM-DD)."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<SetReminderParams>()
    }

    fn requires_identity(&self) -> bool {
        true
    }

    fn session_scoped(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let params: SetReminderParams = parse_params(&args)?;
        let frequency = params.frequency.as_deref().map(normalize_frequency);

        validate_reminder_data(frequency.as_deref(), params.date.as_deref(), today())
            .map_err(|e| ToolError::Rejected(format!("Error: {}", e)))?;

        let record = self
            .store
            .insert_reminder(
                &caller.user_id,
                NewReminder {
                    frequency: frequency.clone(),
                    date: params.date.clone(),
                    chat_id: caller.chat_id.clone(),
                    commitment_id: None,
                },
            )
            .await?;
        tracing::info!(user_id = %caller.user_id, reminder_id = %record.id, "reminder set");

        let mut msg = "Reminder successfully set".to_string();
        if let Some(f) = &frequency {
            msg.push_str(&format!(" for {}", f));
        }
        if let Some(d) = &params.date {
            msg.push_str(&format!(" on {}", d));
        }
        Ok(msg)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateReminderParams {
    /// 要更新的提醒 ID
    reminder_id: String,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

/// 更新已有提醒的频率或日期
pub struct UpdateReminderTool {
    store: Arc<dyn RecordStore>,
}

impl UpdateReminderTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateReminderTool {
    fn name(&self) -> &str {
        "update_user_reminder"
    }

    fn description(&self) -> &str {
        "Update the frequency or date of one of the current user's reminders."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<UpdateReminderParams>()
    }

    fn requires_identity(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let params: UpdateReminderParams = parse_params(&args)?;

        let frequency = params.frequency.as_deref().map(normalize_frequency);
        if let Some(f) = &frequency {
            validate_frequency(f).map_err(|e| ToolError::Rejected(format!("Error: {}", e)))?;
        }
        if let Some(d) = &params.date {
            validate_date(d, today()).map_err(|e| ToolError::Rejected(format!("Error: {}", e)))?;
        }
        if frequency.is_none() && params.date.is_none() {
            return Err(ToolError::Rejected(
                "Error: Must specify either frequency or date for reminder".into(),
            ));
        }

        let updated = self
            .store
            .update_reminder(&caller.user_id, &params.reminder_id, frequency, params.date)
            .await?;
        if !updated {
            return Err(ToolError::Rejected(format!(
                "No reminder found with ID '{}'.",
                params.reminder_id
            )));
        }
        Ok("Reminder successfully updated".into())
    }
}
