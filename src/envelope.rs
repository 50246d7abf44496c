//! Tool result envelope shared by every tool.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// `tools/call` result: one text block plus the error flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl InvocationResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
        }
    }

    /// Pretty-print a payload with two-space indentation.
    pub fn json(payload: &Value) -> Result<Self> {
        let text = serde_json::to_string_pretty(payload).context("Failed to serialize result")?;
        Ok(Self::text(text))
    }

    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_is_two_space_indented() {
        let result = InvocationResult::json(&json!({"a": {"b": 1}})).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.first_text(), "{\n  \"a\": {\n    \"b\": 1\n  }\n}");
    }

    #[test]
    fn test_json_keeps_unicode() {
        let payload = json!({"country": "中国", "city": "北京市"});
        let result = InvocationResult::json(&payload).unwrap();
        assert!(result.first_text().contains("中国"));
        let parsed: Value = serde_json::from_str(result.first_text()).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_json_keeps_remote_key_order() {
        let raw = r#"{"zeta":1,"code":"Success","alpha":2}"#;
        let payload: Value = serde_json::from_str(raw).unwrap();
        let result = InvocationResult::json(&payload).unwrap();
        assert_eq!(
            result.first_text(),
            "{\n  \"zeta\": 1,\n  \"code\": \"Success\",\n  \"alpha\": 2\n}"
        );
    }

    #[test]
    fn test_error_shape() {
        let result = InvocationResult::error("Unknown tool: nope");
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(
            wire,
            json!({
                "content": [{"type": "text", "text": "Unknown tool: nope"}],
                "isError": true
            })
        );
    }
}
