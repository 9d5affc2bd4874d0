//! 记忆层：对话历史（消息 / 角色 / 工具调用请求）与调用方历史过滤

pub mod conversation;

pub use conversation::{
    filter_for_caller, latest_strategy, latest_user_content, Message, Role, ToolCallRequest,
};
