//! 通知载荷：受限字面量解析 + 标记提取与防幻觉校验

pub mod extractor;
pub mod literal;

pub use extractor::{
    extract_notification_payload, has_confirmation, parse_marker, validate_payload,
    NotificationPayload, PAYLOAD_MARKER,
};
pub use literal::{parse_literal, parse_literal_prefix, PayloadError};
