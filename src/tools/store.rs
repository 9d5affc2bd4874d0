//! 领域记录存储：承诺、提醒、日记
//!
//! 工具只依赖 RecordStore trait；默认提供内存实现（进程内 RwLock<HashMap>），按 user_id 隔离。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// 记录存储失败
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub id: String,
    pub user_id: String,
    pub commitment: String,
    pub chat_id: Option<String>,
    pub done: bool,
    pub reminder_set: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub user_id: String,
    pub frequency: Option<String>,
    pub date: Option<String>,
    pub chat_id: Option<String>,
    pub commitment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub journal_entry: String,
    pub created_at: DateTime<Utc>,
}

/// 新提醒
#[derive(Debug, Clone, Default)]
pub struct NewReminder {
    pub frequency: Option<String>,
    pub date: Option<String>,
    pub chat_id: Option<String>,
    pub commitment_id: Option<String>,
}

/// 记录存储接口（所有查询按 user_id 过滤，列表按创建时间倒序）
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_commitments(&self, user_id: &str) -> Result<Vec<CommitmentRecord>, StoreError>;

    async fn count_active_commitments(&self, user_id: &str) -> Result<usize, StoreError>;

    async fn insert_commitment(
        &self,
        user_id: &str,
        commitment: &str,
        chat_id: Option<&str>,
        reminder_set: bool,
    ) -> Result<CommitmentRecord, StoreError>;

    /// 标记完成；记录不存在时返回 false
    async fn complete_commitment(&self, user_id: &str, id: &str) -> Result<bool, StoreError>;

    /// 标记已设置提醒；记录不存在时返回 false
    async fn mark_commitment_reminder(&self, user_id: &str, id: &str) -> Result<bool, StoreError>;

    async fn list_journal_entries(&self, user_id: &str) -> Result<Vec<JournalEntry>, StoreError>;

    async fn list_reminders(&self, user_id: &str) -> Result<Vec<ReminderRecord>, StoreError>;

    async fn insert_reminder(
        &self,
        user_id: &str,
        reminder: NewReminder,
    ) -> Result<ReminderRecord, StoreError>;

    /// 更新频率 / 日期；记录不存在时返回 false
    async fn update_reminder(
        &self,
        user_id: &str,
        id: &str,
        frequency: Option<String>,
        date: Option<String>,
    ) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct Tables {
    commitments: HashMap<String, CommitmentRecord>,
    reminders: HashMap<String, ReminderRecord>,
    journal: HashMap<String, JournalEntry>,
}

/// 内存记录存储
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.sort_by_key(|r| std::cmp::Reverse(key(r)));
    rows
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一条日记（日记由其它渠道产生，这里用于初始化与测试）
    pub async fn add_journal_entry(&self, user_id: &str, text: &str) -> JournalEntry {
        let entry = JournalEntry {
            id: new_id(),
            user_id: user_id.to_string(),
            journal_entry: text.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .journal
            .insert(entry.id.clone(), entry.clone());
        entry
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_commitments(&self, user_id: &str) -> Result<Vec<CommitmentRecord>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .commitments
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |c| c.created_at))
    }

    async fn count_active_commitments(&self, user_id: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .commitments
            .values()
            .filter(|c| c.user_id == user_id && !c.done)
            .count())
    }

    async fn insert_commitment(
        &self,
        user_id: &str,
        commitment: &str,
        chat_id: Option<&str>,
        reminder_set: bool,
    ) -> Result<CommitmentRecord, StoreError> {
        let record = CommitmentRecord {
            id: new_id(),
            user_id: user_id.to_string(),
            commitment: commitment.to_string(),
            chat_id: chat_id.map(String::from),
            done: false,
            reminder_set,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .commitments
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn complete_commitment(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.commitments.get_mut(id) {
            Some(c) if c.user_id == user_id => {
                c.done = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_commitment_reminder(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.commitments.get_mut(id) {
            Some(c) if c.user_id == user_id => {
                c.reminder_set = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_journal_entries(&self, user_id: &str) -> Result<Vec<JournalEntry>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .journal
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |e| e.created_at))
    }

    async fn list_reminders(&self, user_id: &str) -> Result<Vec<ReminderRecord>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .reminders
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    async fn insert_reminder(
        &self,
        user_id: &str,
        reminder: NewReminder,
    ) -> Result<ReminderRecord, StoreError> {
        let record = ReminderRecord {
            id: new_id(),
            user_id: user_id.to_string(),
            frequency: reminder.frequency,
            date: reminder.date,
            chat_id: reminder.chat_id,
            commitment_id: reminder.commitment_id,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .reminders
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_reminder(
        &self,
        user_id: &str,
        id: &str,
        frequency: Option<String>,
        date: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.reminders.get_mut(id) {
            Some(r) if r.user_id == user_id => {
                if frequency.is_some() {
                    r.frequency = frequency;
                    r.date = None;
                }
                if date.is_some() {
                    r.date = date;
                    r.frequency = None;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
