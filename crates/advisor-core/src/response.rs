// Response envelope shared by both analysis endpoints.

use serde::Serialize;
use serde_json::{json, Value};

/// `{ "success": true, "data": ... }` or `{ "success": false, "error": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Placeholder shown when the model returned no recommendations.
pub fn fallback_recommendation() -> Value {
    json!({
        "recommendation": "Error: No recommendations generated. Please try again.",
        "revenue_impact": "Unknown",
        "confidence": 0.0
    })
}

/// Placeholder answer for a question the model left unanswered.
pub fn fallback_answer(question: &str) -> Value {
    json!({
        "question": question,
        "answer": "Error: No answer generated. Please try again.",
        "confidence": 0.0
    })
}

/// The non-empty array under `key`, if the model produced one.
pub fn non_empty_list(value: &Value, key: &str) -> Option<Vec<Value>> {
    value
        .get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .cloned()
}
