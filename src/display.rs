//! Rendering of prompts, notices and poll views
//!
//! Everything here is pure: a poll goes in, an [`OutgoingMessage`] comes out.

use crate::db::{Poll, VoteType};
use crate::transport::{InlineButton, InlineKeyboard, OutgoingMessage};
use std::fmt::Write;

/// Action carried in an inline button's callback data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Stop adding options during creation
    Done(i64),
    /// Start a `new_option` round on a created poll
    AddOption(i64),
}

impl CallbackAction {
    pub fn encode(self) -> String {
        match self {
            CallbackAction::Done(poll_id) => format!("done:{poll_id}"),
            CallbackAction::AddOption(poll_id) => format!("add:{poll_id}"),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (action, poll_id) = data.split_once(':')?;
        let poll_id = poll_id.parse().ok()?;
        match action {
            "done" => Some(CallbackAction::Done(poll_id)),
            "add" => Some(CallbackAction::AddOption(poll_id)),
            _ => None,
        }
    }
}

// ============================================================================
// Creation prompts
// ============================================================================

pub fn name_prompt(vote_type: VoteType) -> OutgoingMessage {
    OutgoingMessage::markdown(format!(
        "Let's create a new poll (*{}*).\nFirst, send me the name of the poll",
        vote_type_label(vote_type)
    ))
}

pub fn description_prompt() -> OutgoingMessage {
    OutgoingMessage::plain("Now send me the description")
}

pub fn first_option_prompt() -> OutgoingMessage {
    OutgoingMessage::plain(
        "Now send me the first option (Or send multiple options at once, each option on a new line)",
    )
}

/// Confirms the options just added and offers to stop
pub fn next_option_prompt(poll: &Poll, added: &[String]) -> OutgoingMessage {
    let mut text = String::from("Options have been added:\n");
    for option in added {
        let _ = write!(text, "\n*{}*", escape_markdown(option));
    }
    text.push_str("\n\nNow send me the next option or press *Done* when you are finished.");

    OutgoingMessage::markdown(text).with_keyboard(InlineKeyboard::single(InlineButton::new(
        "Done",
        CallbackAction::Done(poll.id).encode(),
    )))
}

pub fn vote_count_prompt(poll: &Poll) -> OutgoingMessage {
    let bound = match poll.vote_type {
        VoteType::LimitedVote => format!("between 1 and {}", poll.options.len()),
        _ => "bigger than 0".to_string(),
    };
    OutgoingMessage::plain(format!(
        "How many votes should every user have? Please send me a number {bound}"
    ))
}

// ============================================================================
// Editing
// ============================================================================

pub fn new_option_prompt() -> OutgoingMessage {
    OutgoingMessage::plain(
        "Now send me the new option (Or send multiple options at once, each option on a new line)",
    )
}

pub fn added_options_notice(added: &[String]) -> OutgoingMessage {
    if added.is_empty() {
        return OutgoingMessage::plain("No new option has been added");
    }

    let mut text = String::from("Options have been added:\n");
    for option in added {
        let _ = write!(text, "\n*{}*", escape_markdown(option));
    }
    OutgoingMessage::markdown(text)
}

/// Admin view: the numbered option listing with its action keyboard
pub fn options_listing(poll: &Poll) -> OutgoingMessage {
    let mut text = format!("*{}*\n\nOptions:", escape_markdown(poll_title(poll)));
    for (index, option) in poll.options.iter().enumerate() {
        let _ = write!(text, "\n{}. {}", index + 1, escape_markdown(&option.name));
    }

    OutgoingMessage::markdown(text).with_keyboard(InlineKeyboard::single(InlineButton::new(
        "Add option",
        CallbackAction::AddOption(poll.id).encode(),
    )))
}

// ============================================================================
// Poll view
// ============================================================================

/// Full poll text used for the creator's copy and published copies
pub fn poll_message(poll: &Poll) -> OutgoingMessage {
    let mut text = format!("*{}*", escape_markdown(poll_title(poll)));
    if let Some(description) = poll.description.as_deref() {
        let _ = write!(text, "\n_{}_", escape_markdown(description));
    }
    text.push('\n');
    for option in &poll.options {
        let _ = write!(text, "\n• {}", escape_markdown(&option.name));
    }

    let _ = write!(text, "\n\n{}", vote_type_label(poll.vote_type));
    if let Some(votes) = poll.number_of_votes {
        let _ = write!(text, ", {votes} votes per user");
    }

    OutgoingMessage::markdown(text)
}

pub fn vote_type_label(vote_type: VoteType) -> &'static str {
    match vote_type {
        VoteType::SingleVote => "Single vote",
        VoteType::BlockVote => "Block vote",
        VoteType::LimitedVote => "Limited vote",
        VoteType::CumulativeVote => "Cumulative vote",
        VoteType::CountVote => "Count vote",
        VoteType::Doodle => "Doodle",
    }
}

fn poll_title(poll: &Poll) -> &str {
    poll.name.as_deref().unwrap_or("Unnamed poll")
}

/// Escape user text for Telegram's legacy Markdown
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
