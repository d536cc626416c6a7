//! Routing of Telegram webhook updates onto the poll runtimes

use crate::db::VoteType;
use crate::display::CallbackAction;
use crate::runtime::{HandleOutcome, PollLifecycle, RuntimeError, RuntimeManager, Storage, Transport};
use crate::transport::telegram::{CallbackQuery, Message, Update};

/// What to send back after an update was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    None,
    /// Plain text for the chat, used for rejected input
    Message { chat_id: i64, text: String },
    /// Close the callback spinner, optionally with an alert
    AnswerCallback { id: String, text: Option<String> },
}

pub async fn dispatch_update<S, T, L>(
    manager: &RuntimeManager<S, T, L>,
    update: Update,
) -> Result<WebhookReply, RuntimeError>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    if let Some(query) = update.callback_query {
        return dispatch_callback(manager, query).await;
    }

    match update.message {
        Some(message) => dispatch_message(manager, message).await,
        None => Ok(WebhookReply::None),
    }
}

async fn dispatch_message<S, T, L>(
    manager: &RuntimeManager<S, T, L>,
    message: Message,
) -> Result<WebhookReply, RuntimeError>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    // Polls are only assembled in private chats with their creator
    if !message.chat.is_private() {
        return Ok(WebhookReply::None);
    }
    let (Some(user), Some(text)) = (message.from, message.text) else {
        return Ok(WebhookReply::None);
    };
    let chat_id = message.chat.id;

    if let Some(argument) = create_command_argument(&text) {
        let vote_type = match argument {
            "" => VoteType::default(),
            name => match name.parse::<VoteType>() {
                Ok(vote_type) => vote_type,
                Err(_) => {
                    return Ok(WebhookReply::Message {
                        chat_id,
                        text: unknown_vote_type_text(name),
                    })
                }
            },
        };
        manager.start_poll(user.id, chat_id, vote_type).await?;
        return Ok(WebhookReply::None);
    }

    match manager.handle_user_text(user.id, chat_id, &text).await? {
        HandleOutcome::Rejected { message } => Ok(WebhookReply::Message {
            chat_id,
            text: message,
        }),
        HandleOutcome::Ignored | HandleOutcome::Handled { .. } => Ok(WebhookReply::None),
    }
}

async fn dispatch_callback<S, T, L>(
    manager: &RuntimeManager<S, T, L>,
    query: CallbackQuery,
) -> Result<WebhookReply, RuntimeError>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    let chat_id = query
        .message
        .as_ref()
        .map_or(query.from.id, |message| message.chat.id);

    let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
        tracing::debug!(data = ?query.data, "Ignoring unknown callback data");
        return Ok(WebhookReply::AnswerCallback {
            id: query.id,
            text: None,
        });
    };

    let outcome = match action {
        CallbackAction::Done(poll_id) => manager.finish_options(poll_id, chat_id).await,
        CallbackAction::AddOption(poll_id) => {
            manager
                .begin_new_option(query.from.id, poll_id, chat_id)
                .await
        }
    };

    let text = match outcome {
        Ok(HandleOutcome::Rejected { message }) => Some(message),
        Ok(_) => None,
        Err(RuntimeError::PollNotFound(_)) => Some("This poll no longer exists".to_string()),
        Err(e) => return Err(e),
    };

    Ok(WebhookReply::AnswerCallback { id: query.id, text })
}

/// Argument of `/create` (or `/start`), also in `/create@botname` form
fn create_command_argument(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, argument) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head);
    matches!(name, "create" | "start").then(|| argument.trim())
}

fn unknown_vote_type_text(name: &str) -> String {
    let choices: Vec<&str> = VoteType::ALL.iter().map(|v| v.as_str()).collect();
    format!("Unknown vote type {name}. Choose one of: {}", choices.join(", "))
}
