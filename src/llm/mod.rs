//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、结构化输出解析

pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, SamplingParams, TokenUsage};
pub use structured::{complete_structured, extract_json, parse_structured, schema_instruction};
pub use traits::{LlmClient, LlmError, TokenStream};
