//! Pure state transition function
//!
//! Given the same poll and event it always produces the same next poll and
//! effects; all I/O is left to the runtime executor.

use super::{ingest_options, validate_vote_count, Effect, Event, ExpectedInput, VoteCountError};
use crate::db::Poll;
use crate::display;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub poll: Poll,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(poll: Poll) -> Self {
        Self {
            poll,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Why an event was not applied. The poll is unchanged in every case.
///
/// Except for [`TransitionError::NothingExpected`], the display text is
/// meant to be shown to the user as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Poll is not waiting for input")]
    NothingExpected,
    #[error("Please send me some text")]
    EmptyText,
    #[error("❌ No new options have been added.")]
    NoNewOptions,
    #[error("You need to add at least one option")]
    NoOptions,
    #[error(transparent)]
    InvalidVoteCount(#[from] VoteCountError),
    #[error("Invalid action: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Silent errors are dropped instead of being reported to the chat
    pub fn is_silent(&self) -> bool {
        matches!(self, TransitionError::NothingExpected)
    }
}

pub fn transition(poll: &Poll, event: Event) -> Result<TransitionResult, TransitionError> {
    match (poll.expected_input, event) {
        (ExpectedInput::Nothing, Event::Text { .. }) => Err(TransitionError::NothingExpected),

        // ============================================================
        // Creation sequence
        // ============================================================
        (ExpectedInput::Name, Event::Text { text }) => {
            let mut next = poll.clone();
            next.name = Some(required_text(&text)?);
            next.expected_input = ExpectedInput::Description;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PersistPoll)
                .with_effect(Effect::send(display::description_prompt())))
        }

        (ExpectedInput::Description, Event::Text { text }) => {
            let mut next = poll.clone();
            next.description = Some(required_text(&text)?);
            next.expected_input = ExpectedInput::Options;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PersistPoll)
                .with_effect(Effect::send(display::first_option_prompt())))
        }

        // Stays in Options until the creator presses "done"
        (ExpectedInput::Options, Event::Text { text }) => {
            let mut next = poll.clone();
            let added = ingest_options(&mut next, &text);
            if added.is_empty() {
                return Err(TransitionError::NoNewOptions);
            }
            let prompt = display::next_option_prompt(&next, &added);
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PersistPoll)
                .with_effect(Effect::send(prompt)))
        }

        (ExpectedInput::Options, Event::FinishOptions) => {
            if poll.options.is_empty() {
                return Err(TransitionError::NoOptions);
            }
            let mut next = poll.clone();
            if poll.vote_type.requires_vote_count() {
                next.expected_input = ExpectedInput::VoteCount;
                let prompt = display::vote_count_prompt(&next);
                Ok(TransitionResult::new(next)
                    .with_effect(Effect::PersistPoll)
                    .with_effect(Effect::send(prompt)))
            } else {
                next.expected_input = ExpectedInput::Nothing;
                Ok(TransitionResult::new(next)
                    .with_effect(Effect::PersistPoll)
                    .with_effect(Effect::FinalizePoll))
            }
        }

        (ExpectedInput::VoteCount, Event::Text { text }) => {
            let amount = validate_vote_count(poll.vote_type, poll.options.len(), &text)?;
            let mut next = poll.clone();
            next.number_of_votes = Some(amount);
            next.expected_input = ExpectedInput::Nothing;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PersistPoll)
                .with_effect(Effect::FinalizePoll))
        }

        // ============================================================
        // Editing a created poll
        // ============================================================
        (ExpectedInput::Nothing | ExpectedInput::NewOption, Event::BeginNewOption)
            if poll.created =>
        {
            let mut next = poll.clone();
            next.expected_input = ExpectedInput::NewOption;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::PersistPoll)
                .with_effect(Effect::send(display::new_option_prompt())))
        }

        // The round completes even when nothing was added: the admin view is
        // re-sent either way
        (ExpectedInput::NewOption, Event::Text { text }) => {
            let (mut result, _added) = ingest_and_reconcile(poll, &text);
            result.poll.expected_input = ExpectedInput::Nothing;
            Ok(result)
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} while waiting for {state}"
        ))),
    }
}

/// Ingest options and reconcile the admin view without touching the
/// expected input.
///
/// Used by the `new_option` round and by edit contexts that bypass the
/// conversation entirely.
pub fn ingest_and_reconcile(poll: &Poll, text: &str) -> (TransitionResult, Vec<String>) {
    let mut next = poll.clone();
    let added = ingest_options(&mut next, text);
    let notice = display::added_options_notice(&added);
    let listing = display::options_listing(&next);
    let result = TransitionResult::new(next)
        .with_effect(Effect::PersistPoll)
        .with_effect(Effect::send(notice))
        .with_effect(Effect::reconcile(listing));
    (result, added)
}

fn required_text(text: &str) -> Result<String, TransitionError> {
    match text.trim() {
        "" => Err(TransitionError::EmptyText),
        trimmed => Ok(trimmed.to_string()),
    }
}
