//! Trait abstractions for runtime I/O
//!
//! These traits let the executor run against in-memory storage and a
//! recording transport in tests.

use crate::db::{Poll, Reference, ReferenceKind, VoteType};
use crate::transport::{OutgoingMessage, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for polls and their options
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Create a poll waiting for its name
    async fn create_poll(&self, user_id: i64, vote_type: VoteType) -> Result<Poll, String>;

    /// Load a poll with its options; `None` if it does not exist
    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, String>;

    /// Persist fields and newly appended options
    async fn save_poll(&self, poll: &Poll) -> Result<(), String>;
}

/// Storage for the poll each user is working on
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn set_current_poll(&self, user_id: i64, poll_id: Option<i64>) -> Result<(), String>;

    async fn current_poll(&self, user_id: i64) -> Result<Option<i64>, String>;
}

/// Storage for message references
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Atomically swap the admin reference for (poll, chat)
    async fn replace_admin_reference(
        &self,
        poll_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Reference, String>;

    async fn add_reference(
        &self,
        poll_id: i64,
        kind: ReferenceKind,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Reference, String>;

    async fn list_references(&self, poll_id: i64) -> Result<Vec<Reference>, String>;
}

/// Delivery of messages to chats
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a new message, returning its message id
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, TransportError>;

    /// Overwrite an existing message
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError>;
}

/// Poll lifecycle beyond the conversation: finalizing and published copies
#[async_trait]
pub trait PollLifecycle: Send + Sync {
    /// Complete creation; returns the poll as finalized
    async fn finalize(&self, poll: &Poll, chat_id: i64) -> Result<Poll, String>;

    /// Re-render every published copy of the poll
    async fn refresh(&self, poll: &Poll) -> Result<(), String>;
}

/// Combined storage trait for convenience
pub trait Storage: PollStore + UserStore + ReferenceStore {}
impl<T: PollStore + UserStore + ReferenceStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: PollStore + ?Sized> PollStore for Arc<T> {
    async fn create_poll(&self, user_id: i64, vote_type: VoteType) -> Result<Poll, String> {
        (**self).create_poll(user_id, vote_type).await
    }

    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, String> {
        (**self).get_poll(poll_id).await
    }

    async fn save_poll(&self, poll: &Poll) -> Result<(), String> {
        (**self).save_poll(poll).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, TransportError> {
        (**self).send_message(chat_id, message).await
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        (**self).edit_message(chat_id, message_id, message).await
    }
}

#[async_trait]
impl<T: PollLifecycle + ?Sized> PollLifecycle for Arc<T> {
    async fn finalize(&self, poll: &Poll, chat_id: i64) -> Result<Poll, String> {
        (**self).finalize(poll, chat_id).await
    }

    async fn refresh(&self, poll: &Poll) -> Result<(), String> {
        (**self).refresh(poll).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::{Database, DbError};
use crate::transport::TelegramClient;

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PollStore for DatabaseStorage {
    async fn create_poll(&self, user_id: i64, vote_type: VoteType) -> Result<Poll, String> {
        self.db
            .create_poll(user_id, vote_type)
            .map_err(|e| e.to_string())
    }

    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, String> {
        match self.db.get_poll(poll_id) {
            Ok(poll) => Ok(Some(poll)),
            Err(DbError::PollNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save_poll(&self, poll: &Poll) -> Result<(), String> {
        self.db.save_poll(poll).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl UserStore for DatabaseStorage {
    async fn set_current_poll(&self, user_id: i64, poll_id: Option<i64>) -> Result<(), String> {
        self.db
            .set_current_poll(user_id, poll_id)
            .map_err(|e| e.to_string())
    }

    async fn current_poll(&self, user_id: i64) -> Result<Option<i64>, String> {
        self.db.get_current_poll(user_id).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ReferenceStore for DatabaseStorage {
    async fn replace_admin_reference(
        &self,
        poll_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Reference, String> {
        self.db
            .replace_admin_reference(poll_id, chat_id, message_id)
            .map_err(|e| e.to_string())
    }

    async fn add_reference(
        &self,
        poll_id: i64,
        kind: ReferenceKind,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Reference, String> {
        self.db
            .add_reference(poll_id, kind, chat_id, message_id)
            .map_err(|e| e.to_string())
    }

    async fn list_references(&self, poll_id: i64) -> Result<Vec<Reference>, String> {
        self.db.list_references(poll_id).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, TransportError> {
        TelegramClient::send_message(self, chat_id, message).await
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        TelegramClient::edit_message(self, chat_id, message_id, message).await
    }
}
