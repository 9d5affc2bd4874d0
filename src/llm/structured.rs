//! 结构化输出：把目标类型的 JSON Schema 拼进 system prompt，从回复中提取 JSON 并反序列化
//!
//! 空回复、`null` 一律视为 EmptyResponse（可重试），格式不符为 InvalidResponse（可重试）。

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 生成「只回复符合此 Schema 的 JSON」的说明段
pub fn schema_instruction<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Respond ONLY with a single JSON object matching this JSON Schema, no extra prose:\n```json\n{}\n```",
        schema_json
    )
}

/// 从模型回复中提取 JSON 片段：优先 ```json 代码块，其次最外层花括号
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(body.trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 解析一段结构化回复
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(LlmError::EmptyResponse);
    }
    let json_str = extract_json(trimmed)
        .ok_or_else(|| LlmError::InvalidResponse(format!("no JSON object in: {}", trimmed)))?;
    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, json_str)))?;
    if value.is_null() {
        return Err(LlmError::EmptyResponse);
    }
    serde_json::from_value(value).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

/// 以 system prompt + schema 说明 + 对话消息调用模型，返回类型化结果
pub async fn complete_structured<T>(
    llm: &dyn LlmClient,
    system: &str,
    messages: &[Message],
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let mut full = Vec::with_capacity(messages.len() + 1);
    full.push(Message::system(format!(
        "{}\n\n{}",
        system,
        schema_instruction::<T>()
    )));
    full.extend(messages.iter().cloned());

    let raw = llm.complete(&full).await?;
    parse_structured(&raw)
}
