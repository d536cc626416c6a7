//! API request and response types

use crate::db::{Poll, Reference, VoteType};
use serde::{Deserialize, Serialize};

/// Request to start creating a poll
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub user_id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub vote_type: VoteType,
}

/// Text sent by the poll's creator
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub chat_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct NewOptionRequest {
    pub user_id: i64,
    pub chat_id: i64,
}

/// Register a published copy of a poll
#[derive(Debug, Deserialize)]
pub struct PublishedReferenceRequest {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub poll: Poll,
}

/// Options actually added, in order
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub added: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReferencesResponse {
    pub references: Vec<Reference>,
}

#[derive(Debug, Serialize)]
pub struct ReferenceResponse {
    pub reference: Reference,
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
