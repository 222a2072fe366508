//! JSON-RPC 2.0 wire types for the tool-server stdio transport
//! (`spec.md` §4.3), one object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// True when this line carries no `id` and is thus a notification, not a
    /// response — such lines are skipped by the reader rather than matched
    /// against a pending request.
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }

    pub fn into_result(self) -> Result<Value, String> {
        if let Some(err) = self.error {
            return Err(format!(
                "MCP error {} ({}): {}",
                err.code,
                err.message,
                err.data.unwrap_or(Value::Null)
            ));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Extract the canonical result text: concatenate `content[].text` fields
/// newline-joined when present, else fall back to the raw JSON text
/// (`spec.md` §4.3 "Tool result extraction").
pub fn extract_result_text(result: &Value) -> String {
    if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
        let joined: Vec<&str> = content
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();
        if !joined.is_empty() {
            return joined.join("\n");
        }
    }
    serde_json::to_string(result).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_params_when_none() {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Value::Number(1.into()),
            method: "tools/list".to_string(),
            params: None,
        };
        let s = serde_json::to_string(&req).unwrap();
        assert!(!s.contains("params"));
    }

    #[test]
    fn response_with_error_becomes_err() {
        let raw = r#"{"id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(err.contains("Method not found"));
    }

    #[test]
    fn notification_has_null_id() {
        let raw = r#"{"method":"notifications/progress"}"#;
        let resp: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.is_notification());
    }

    #[test]
    fn extract_result_text_joins_content_fields() {
        let result = json!({"content": [{"text": "line one"}, {"text": "line two"}]});
        assert_eq!(extract_result_text(&result), "line one\nline two");
    }

    #[test]
    fn extract_result_text_falls_back_to_raw_json() {
        let result = json!({"tools": []});
        assert_eq!(extract_result_text(&result), r#"{"tools":[]}"#);
    }
}
