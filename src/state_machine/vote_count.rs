//! Vote-count validation
//!
//! The per-user vote budget only exists for limited and cumulative voting.
//! Parse failures and out-of-range numbers share one message per mode.

use crate::db::VoteType;
use std::num::IntErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteCountError {
    #[error("Please send me a number between 1 and {max}")]
    OutsideOptionRange { max: usize },
    #[error("Please send me a number bigger than 0")]
    NotPositive,
    /// Positive, but past what a vote budget can store
    #[error("Please send me a number no bigger than {}", i64::MAX)]
    TooLarge,
    /// The poll's vote type has no vote budget; upstream should never ask
    #[error("Polls with {0} voting don't take a vote count")]
    Unsupported(VoteType),
}

/// Validate `text` as the number of votes per user for a poll of
/// `vote_type` with `option_count` options.
pub fn validate_vote_count(
    vote_type: VoteType,
    option_count: usize,
    text: &str,
) -> Result<i64, VoteCountError> {
    let (rejection, upper) = match vote_type {
        VoteType::LimitedVote => (
            VoteCountError::OutsideOptionRange { max: option_count },
            i64::try_from(option_count).unwrap_or(i64::MAX),
        ),
        VoteType::CumulativeVote => (VoteCountError::NotPositive, i64::MAX),
        other => return Err(VoteCountError::Unsupported(other)),
    };

    let amount = match text.trim().parse::<i64>() {
        Ok(amount) => amount,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow && vote_type == VoteType::CumulativeVote => {
            return Err(VoteCountError::TooLarge)
        }
        Err(_) => return Err(rejection),
    };

    if (1..=upper).contains(&amount) {
        Ok(amount)
    } else {
        Err(rejection)
    }
}
