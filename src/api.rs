//! Response envelope for the intake and read endpoints.

use serde::Serialize;
use serde_json::{Value, json};

/// Status code plus JSON body, ready for whatever transport serves it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn validation_failed(messages: impl Serialize) -> Self {
        Self::new(
            422,
            json!({
                "success": false,
                "error": "Validation failed",
                "messages": messages,
            }),
        )
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(404, json!({ "success": false, "error": message }))
    }

    pub fn server_error(message: String) -> Self {
        Self::new(500, json!({ "success": false, "error": message }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
