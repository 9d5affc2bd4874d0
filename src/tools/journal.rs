//! 日记查询工具

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::registry::Caller;
use crate::tools::store::RecordStore;
use crate::tools::{Tool, ToolError};

/// 按时间倒序返回当前用户的日记
pub struct FetchJournalEntriesTool {
    store: Arc<dyn RecordStore>,
}

impl FetchJournalEntriesTool {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FetchJournalEntriesTool {
    fn name(&self) -> &str {
        "fetch_user_journal_entries"
    }

    fn description(&self) -> &str {
        "Fetch the current user's journal entries (newest first) to ground the conversation in what they wrote."
    }

    fn requires_identity(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let caller = Caller::from_args(&args)?;
        let entries = self.store.list_journal_entries(&caller.user_id).await?;
        let formatted: Vec<Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "journal_entry": e.journal_entry,
                    "user_id": e.user_id,
                    "created_at": e.created_at.to_rfc3339(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "user_id": caller.user_id,
            "total_entries": formatted.len(),
            "journal_entries": formatted,
        });
        serde_json::to_string_pretty(&out).map_err(|e| ToolError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::store::MemoryRecordStore;

    #[tokio::test]
    async fn test_fetch_journal_entries() {
        let store = Arc::new(MemoryRecordStore::new());
        store.add_journal_entry("u1", "felt focused today").await;
        store.add_journal_entry("u2", "someone else").await;

        let tool = FetchJournalEntriesTool::new(store);
        let out = tool
            .execute(serde_json::json!({"user_id": "u1", "access_token": "t"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["total_entries"], 1);
        assert_eq!(v["journal_entries"][0]["journal_entry"], "felt focused today");
    }
}
