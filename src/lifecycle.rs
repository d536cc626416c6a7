//! Publishing lifecycle: finalizing created polls and keeping their
//! published copies current

use crate::db::{Poll, ReferenceKind};
use crate::display;
use crate::runtime::{PollLifecycle, Storage, Transport};
use crate::transport::{InlineButton, InlineKeyboard};
use async_trait::async_trait;
use std::sync::Arc;

pub struct PublishingLifecycle<S, T> {
    storage: S,
    transport: Arc<T>,
}

impl<S, T> PublishingLifecycle<S, T>
where
    S: Storage,
    T: Transport,
{
    pub fn new(storage: S, transport: Arc<T>) -> Self {
        Self { storage, transport }
    }
}

#[async_trait]
impl<S, T> PollLifecycle for PublishingLifecycle<S, T>
where
    S: Storage,
    T: Transport,
{
    async fn finalize(&self, poll: &Poll, chat_id: i64) -> Result<Poll, String> {
        let mut created = poll.clone();
        created.created = true;
        self.storage.save_poll(&created).await?;

        let button = InlineButton::new(
            "Add option",
            display::CallbackAction::AddOption(created.id).encode(),
        );
        let message = display::poll_message(&created).with_keyboard(InlineKeyboard::single(button));
        let message_id = self
            .transport
            .send_message(chat_id, &message)
            .await
            .map_err(|e| e.to_string())?;

        self.storage
            .replace_admin_reference(created.id, chat_id, message_id)
            .await?;

        tracing::info!(poll_id = created.id, chat_id, message_id, "Poll created");
        Ok(created)
    }

    async fn refresh(&self, poll: &Poll) -> Result<(), String> {
        let references = self.storage.list_references(poll.id).await?;
        let message = display::poll_message(poll);

        // Admin views are re-sent by the caller, only published copies are edited
        for reference in references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Published)
        {
            match self
                .transport
                .edit_message(reference.chat_id, reference.message_id, &message)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_modified() => {}
                Err(e) => {
                    tracing::warn!(
                        poll_id = poll.id,
                        chat_id = reference.chat_id,
                        message_id = reference.message_id,
                        error = %e,
                        "Failed to refresh published poll"
                    );
                }
            }
        }

        Ok(())
    }
}
