pub mod commitment;
pub mod dispatcher;
pub mod error;
pub mod journal;
pub mod registry;
pub mod reminder;
pub mod reminder_offer;
pub mod schema;
pub mod store;
pub mod validation;

use std::sync::Arc;

pub use commitment::{
    CompleteCommitmentTool, CreateCommitmentTool, FetchCommitmentsTool, MAX_ACTIVE_COMMITMENTS,
};
pub use dispatcher::{DispatchContext, ToolDispatcher};
pub use error::{ToolError, MISSING_IDENTITY_MESSAGE};
pub use journal::FetchJournalEntriesTool;
pub use registry::{Caller, Tool, ToolRegistry, ACCESS_TOKEN_ARG, CHAT_ID_ARG, USER_ID_ARG};
pub use reminder::{FetchRemindersTool, SetReminderTool, UpdateReminderTool};
pub use reminder_offer::{DeclineReminderTool, OfferReminderTool, SetCommitmentReminderTool};
pub use schema::{params_schema, parse_params};
pub use store::{
    CommitmentRecord, JournalEntry, MemoryRecordStore, NewReminder, RecordStore, ReminderRecord,
    StoreError,
};

/// 注册全部辅导工具（承诺、提醒、日记）
pub fn register_default_tools(registry: &mut ToolRegistry, store: Arc<dyn RecordStore>) {
    registry.register(FetchCommitmentsTool::new(store.clone()));
    registry.register(CreateCommitmentTool::new(store.clone()));
    registry.register(CompleteCommitmentTool::new(store.clone()));
    registry.register(FetchJournalEntriesTool::new(store.clone()));
    registry.register(FetchRemindersTool::new(store.clone()));
    registry.register(SetReminderTool::new(store.clone()));
    registry.register(UpdateReminderTool::new(store.clone()));
    registry.register(OfferReminderTool);
    registry.register(SetCommitmentReminderTool::new(store));
    registry.register(DeclineReminderTool);
}
