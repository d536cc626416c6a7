//! Outgoing chat messages and the transport error model
//!
//! The runtime only ever speaks in [`OutgoingMessage`]s; how they reach a
//! chat is up to the [`crate::runtime::Transport`] implementation.

pub mod telegram;

pub use telegram::TelegramClient;

use serde::Serialize;
use thiserror::Error;

/// A message to render in a chat, with an optional inline keyboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Render `text` as Markdown
    pub markdown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Rows of callback buttons, serialized in Bot API `reply_markup` shape
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn single(button: InlineButton) -> Self {
        Self {
            inline_keyboard: vec![vec![button]],
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.inline_keyboard.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Transport error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Api, message)
    }

    pub fn not_modified(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotModified, message)
    }

    pub fn is_not_modified(&self) -> bool {
        self.kind == TransportErrorKind::NotModified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Timeouts, refused connections, unreadable responses
    Network,
    /// The chat service rejected the call
    Api,
    /// An edit would leave the message exactly as it is
    NotModified,
}
