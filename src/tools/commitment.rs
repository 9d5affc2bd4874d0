//! 承诺工具：查询、创建（最多 5 个进行中）、完成

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::registry::Caller;
use crate::tools::schema::{params_schema, parse_params};
use crate::tools::store::{CommitmentRecord, RecordStore};
use crate::tools::{Tool, ToolError};

/// 进行中承诺上限
pub const MAX_ACTIVE_COMMITMENTS: usize = 5;

fn commitment_json(c: &CommitmentRecord) -> Value {
    serde_json::json!({
        "id": c.id,
        "commitment": c.commitment,
        "chat_id": c.chat_id,
        "done": c.done,
        "reminder_set": c.reminder_set,
        "created_at": c.created_at.to_rfc3339(),
    })
}

/// 查询当前用户的全部承诺，附带进行中 / 已完成计数与剩余名额
pub struct FetchCommitmentsTool {
    store: Arc<dyn RecordStore>,
}

impl FetchCommitmentsTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FetchCommitmentsTool {
    fn name(&self) -> &str {
        "fetch_user_commitments"
    }

    fn description(&self) -> &str {
        "Fetch all commitments for the current user with active/completed counts and whether more can be added (5 active limit)."
    }

    fn requires_identity(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let rows = self.store.list_commitments(&caller.user_id).await?;

        let (completed, active): (Vec<_>, Vec<_>) = rows.iter().partition(|c| c.done);
        let summary = serde_json::json!({
            "user_id": caller.user_id,
            "total_commitments": rows.len(),
            "active_commitments": active.iter().map(|c| commitment_json(c)).collect::<Vec<_>>(),
            "active_count": active.len(),
            "completed_commitments": completed.iter().map(|c| commitment_json(c)).collect::<Vec<_>>(),
            "completed_count": completed.len(),
            "can_add_more": active.len() < MAX_ACTIVE_COMMITMENTS,
            "remaining_slots": MAX_ACTIVE_COMMITMENTS.saturating_sub(active.len()),
        });
        tracing::info!(
            user_id = %caller.user_id,
            active = active.len(),
            completed = completed.len(),
            "commitments fetched"
        );
        serde_json::to_string_pretty(&summary).map_err(|e| ToolError::Internal(e.to_string()))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateCommitmentParams {
    /// 用户要设定的承诺内容
    commitment_text: String,
    /// 是否已设置提醒
    #[serde(default)]
    reminder_set: bool,
}

/// 创建承诺：校验 5 个进行中上限，成功后提示 Brain 询问是否设置提醒
pub struct CreateCommitmentTool {
    store: Arc<dyn RecordStore>,
}

impl CreateCommitmentTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateCommitmentTool {
    fn name(&self) -> &str {
        "create_user_commitment"
    }

    fn description(&self) -> &str {
        "Create a new commitment for the current user after the coaching flow. Enforces the 5 active commitment limit."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<CreateCommitmentParams>()
    }

    fn requires_identity(&self) -> bool {
        true
    }

    fn session_scoped(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let params: CreateCommitmentParams = parse_params(&args)?;
        let text = params.commitment_text.trim();
        if text.is_empty() {
            return Err(ToolError::Rejected(
                "Please provide the commitment text you'd like to set.".into(),
            ));
        }

        let active = self.store.count_active_commitments(&caller.user_id).await?;
        if active >= MAX_ACTIVE_COMMITMENTS {
            return Err(ToolError::Rejected(format!(
                "You already have {} active commitments. Please complete some existing commitments before adding new ones. I can help you work on completing your current commitments if you'd like.",
                active
            )));
        }

        let record = self
            .store
            .insert_commitment(
                &caller.user_id,
                text,
                caller.chat_id.as_deref(),
                params.reminder_set,
            )
            .await?;
        tracing::info!(
            user_id = %caller.user_id,
            commitment_id = %record.id,
            remaining_slots = MAX_ACTIVE_COMMITMENTS - active - 1,
            "commitment created"
        );

        Ok(format!(
            "✅ Commitment successfully set: '{}'\n\nYour commitment has been saved and you can track it on your home screen.\n\n[OFFER_REMINDER: true, COMMITMENT_ID: {}]",
            text, record.id
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CompleteCommitmentParams {
    /// 要标记完成的承诺 ID
    commitment_id: String,
}

/// 标记承诺完成
pub struct CompleteCommitmentTool {
    store: Arc<dyn RecordStore>,
}

impl CompleteCommitmentTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CompleteCommitmentTool {
    fn name(&self) -> &str {
        "complete_user_commitment"
    }

    fn description(&self) -> &str {
        "Mark an existing commitment of the current user as completed."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<CompleteCommitmentParams>()
    }

    fn requires_identity(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let params: CompleteCommitmentParams = parse_params(&args)?;
        let id = params.commitment_id.trim();
        if id.is_empty() {
            return Err(ToolError::Rejected(
                "Commitment ID is required and cannot be empty".into(),
            ));
        }

        if !self.store.complete_commitment(&caller.user_id, id).await? {
            return Err(ToolError::Rejected(format!(
                "I couldn't find a commitment with ID '{}'.",
                id
            )));
        }
        tracing::info!(user_id = %caller.user_id, commitment_id = %id, "commitment completed");
        Ok("🎉 Congratulations! Your commitment has been marked as complete. Great job following through!".into())
    }
}
