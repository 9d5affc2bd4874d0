//! 工具参数 JSON Schema 生成与参数解析（schemars 自动生成，serde 反序列化）

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tools::ToolError;

/// 参数类型的 JSON Schema（作为 Tool::parameters_schema 返回值）
pub fn params_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// 将模型给出的参数解析为类型化参数；多余字段（含注入字段）忽略
pub fn parse_params<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Params {
        /// 承诺 ID
        commitment_id: String,
        #[serde(default)]
        frequency: Option<String>,
    }

    #[test]
    fn test_schema_lists_properties() {
        let schema = params_schema::<Params>();
        let props = schema.get("properties").unwrap();
        assert!(props.get("commitment_id").is_some());
        assert!(props.get("frequency").is_some());
    }

    #[test]
    fn test_parse_params_ignores_injected_fields() {
        let p: Params = parse_params(&serde_json::json!({
            "commitment_id": "c1", "user_id": "u", "access_token": "t"
        }))
        .unwrap();
        assert_eq!(p.commitment_id, "c1");
        assert!(p.frequency.is_none());

        let err = parse_params::<Params>(&Value::Null).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
