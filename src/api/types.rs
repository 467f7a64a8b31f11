//! API request and response types

use crate::db::ConversationSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to create a new conversation
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
    pub settings: Option<ConversationSettings>,
}

/// Request to update title and/or settings
#[derive(Debug, Default, Deserialize)]
pub struct UpdateConversationRequest {
    pub title: Option<String>,
    pub settings: Option<ConversationSettings>,
}

/// Request to stream one prompt through a session
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub prompt: String,
    /// Session key for prompts not bound to a stored conversation
    pub session: Option<String>,
}

/// Query parameters for conversation listing
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for the health endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Value>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
