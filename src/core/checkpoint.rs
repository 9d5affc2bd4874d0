//! 检查点存储：按 session_id 保存 / 读取 / 删除整份 TurnState
//!
//! 每个会话只保留最新一份（覆盖写，不做版本）。内存实现用于测试与开发；
//! 启用 `async-sqlite` feature 后可用 SqliteCheckpointStore 落盘。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::state::TurnState;

/// 检查点读写失败
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Checkpoint backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for CheckpointError {
    fn from(e: sqlx::Error) -> Self {
        CheckpointError::Backend(e.to_string())
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<TurnState>, CheckpointError>;

    async fn put(&self, session_id: &str, state: &TurnState) -> Result<(), CheckpointError>;

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// 内存检查点：存序列化后的 JSON，与落盘实现行为一致（凭证不会被保存）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: RwLock<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<TurnState>, CheckpointError> {
        let guard = self.states.read().await;
        match guard.get(session_id) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, session_id: &str, state: &TurnState) -> Result<(), CheckpointError> {
        let raw = serde_json::to_string(state)?;
        self.states.write().await.insert(session_id.to_string(), raw);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.states.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use super::{CheckpointError, CheckpointStore};
    use crate::core::state::TurnState;

    /// SQLite 检查点存储（sqlx，全异步）
    pub struct SqliteCheckpointStore {
        pool: SqlitePool,
    }

    impl SqliteCheckpointStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let store = Self { pool };
            store.init_tables().await?;
            Ok(store)
        }

        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        async fn init_tables(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS checkpoints (
                    session_id TEXT PRIMARY KEY,
                    state TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl CheckpointStore for SqliteCheckpointStore {
        async fn get(&self, session_id: &str) -> Result<Option<TurnState>, CheckpointError> {
            let row = sqlx::query("SELECT state FROM checkpoints WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => {
                    let raw: String = row.get("state");
                    Ok(Some(serde_json::from_str(&raw)?))
                }
                None => Ok(None),
            }
        }

        async fn put(&self, session_id: &str, state: &TurnState) -> Result<(), CheckpointError> {
            let raw = serde_json::to_string(state)?;
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT OR REPLACE INTO checkpoints (session_id, state, updated_at) VALUES (?, ?, ?)",
            )
            .bind(session_id)
            .bind(&raw)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
            sqlx::query("DELETE FROM checkpoints WHERE session_id = ?")
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core::Credential;
        use crate::memory::Message;

        #[tokio::test]
        async fn test_sqlite_roundtrip_and_overwrite() {
            let dir = tempfile::tempdir().unwrap();
            let store = SqliteCheckpointStore::new(dir.path().join("cp.db")).await.unwrap();

            let mut state = TurnState::new("s1");
            state.messages.push(Message::user("hi"));
            state.access_token = Some(Credential::new("secret"));
            store.put("s1", &state).await.unwrap();

            state.messages.push(Message::assistant("hello"));
            store.put("s1", &state).await.unwrap();

            let loaded = store.get("s1").await.unwrap().unwrap();
            assert_eq!(loaded.messages.len(), 2);
            assert!(loaded.access_token.is_none());

            store.delete("s1").await.unwrap();
            assert!(store.get("s1").await.unwrap().is_none());
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteCheckpointStore;
