//! Conversation state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which piece of creation data the next text message should fill.
///
/// Stored on the poll itself and only read or written by the poll's runtime
/// task, so two messages for the same poll never observe the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedInput {
    /// No active expectation; text for this poll is ignored
    #[default]
    #[serde(rename = "none")]
    Nothing,
    Name,
    Description,
    Options,
    VoteCount,
    /// Options appended to an already created poll
    NewOption,
}

impl ExpectedInput {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpectedInput::Nothing => "none",
            ExpectedInput::Name => "name",
            ExpectedInput::Description => "description",
            ExpectedInput::Options => "options",
            ExpectedInput::VoteCount => "vote_count",
            ExpectedInput::NewOption => "new_option",
        }
    }
}

impl fmt::Display for ExpectedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown expected input: {0}")]
pub struct UnknownExpectedInput(pub String);

impl FromStr for ExpectedInput {
    type Err = UnknownExpectedInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ExpectedInput::Nothing),
            "name" => Ok(ExpectedInput::Name),
            "description" => Ok(ExpectedInput::Description),
            "options" => Ok(ExpectedInput::Options),
            "vote_count" => Ok(ExpectedInput::VoteCount),
            "new_option" => Ok(ExpectedInput::NewOption),
            other => Err(UnknownExpectedInput(other.to_string())),
        }
    }
}
