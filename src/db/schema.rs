//! Database schema and types

pub use crate::state_machine::state::ExpectedInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS polls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT,
    description TEXT,
    vote_type TEXT NOT NULL,
    number_of_votes INTEGER,
    expected_input TEXT NOT NULL DEFAULT 'none',
    created BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_polls_user ON polls(user_id);

CREATE TABLE IF NOT EXISTS poll_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    poll_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,

    FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE,
    UNIQUE (poll_id, position),
    UNIQUE (poll_id, name)
);

CREATE TABLE IF NOT EXISTS poll_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    poll_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    chat_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_references_poll ON poll_references(poll_id);

-- At most one admin view per (poll, chat)
CREATE UNIQUE INDEX IF NOT EXISTS idx_references_admin
    ON poll_references(poll_id, chat_id) WHERE kind = 'admin';

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    current_poll_id INTEGER,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (current_poll_id) REFERENCES polls(id) ON DELETE SET NULL
);
";

/// Voting mode of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    #[default]
    SingleVote,
    BlockVote,
    /// Each voter picks up to `number_of_votes` options
    LimitedVote,
    /// Each voter distributes `number_of_votes` votes freely
    CumulativeVote,
    CountVote,
    Doodle,
}

impl VoteType {
    pub const ALL: [VoteType; 6] = [
        VoteType::SingleVote,
        VoteType::BlockVote,
        VoteType::LimitedVote,
        VoteType::CumulativeVote,
        VoteType::CountVote,
        VoteType::Doodle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::SingleVote => "single_vote",
            VoteType::BlockVote => "block_vote",
            VoteType::LimitedVote => "limited_vote",
            VoteType::CumulativeVote => "cumulative_vote",
            VoteType::CountVote => "count_vote",
            VoteType::Doodle => "doodle",
        }
    }

    /// Whether creation asks for a per-user vote budget
    pub fn requires_vote_count(self) -> bool {
        matches!(self, VoteType::LimitedVote | VoteType::CumulativeVote)
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown vote type: {0}")]
pub struct UnknownVoteType(pub String);

impl FromStr for VoteType {
    type Err = UnknownVoteType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoteType::ALL
            .into_iter()
            .find(|vote_type| vote_type.as_str() == s)
            .ok_or_else(|| UnknownVoteType(s.to_string()))
    }
}

/// One selectable choice; its position in `Poll::options` is its display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub name: String,
}

impl PollOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Poll record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub user_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub options: Vec<PollOption>,
    pub vote_type: VoteType,
    pub number_of_votes: Option<i64>,
    pub expected_input: ExpectedInput,
    /// Set once the creation sequence has been finalized
    pub created: bool,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// A poll that has just started creation and waits for its name
    pub fn draft(id: i64, user_id: i64, vote_type: VoteType) -> Self {
        Self {
            id,
            user_id,
            name: None,
            description: None,
            options: Vec::new(),
            vote_type,
            number_of_votes: None,
            expected_input: ExpectedInput::Name,
            created: false,
            created_at: Utc::now(),
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn option_names(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.name.as_str()).collect()
    }
}

/// What a referenced message shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Management / option listing in the creator's chat
    Admin,
    /// Voter-facing copy maintained by publishing collaborators
    Published,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Admin => "admin",
            ReferenceKind::Published => "published",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown reference kind: {0}")]
pub struct UnknownReferenceKind(pub String);

impl FromStr for ReferenceKind {
    type Err = UnknownReferenceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(ReferenceKind::Admin),
            "published" => Ok(ReferenceKind::Published),
            other => Err(UnknownReferenceKind(other.to_string())),
        }
    }
}

/// Durable pointer from a poll to one rendered message in one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: i64,
    pub poll_id: i64,
    pub kind: ReferenceKind,
    pub chat_id: i64,
    pub message_id: i64,
    pub created_at: DateTime<Utc>,
}
