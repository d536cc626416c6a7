//! Per-poll runtime executor
//!
//! One runtime task owns one poll. Requests are processed strictly one at a
//! time, so a transition and all of its effects complete before the next
//! message for the same poll is looked at.

use super::traits::{PollLifecycle, Storage, Transport};
use super::RuntimeError;

use crate::db::Poll;
use crate::state_machine::{ingest_and_reconcile, transition, Effect, Event, TransitionResult};
use crate::transport::OutgoingMessage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Work queued for a poll runtime
#[derive(Debug)]
pub enum PollRequest {
    /// Feed an event through the conversation state machine
    Event {
        chat_id: i64,
        event: Event,
        reply: oneshot::Sender<Result<HandleOutcome, RuntimeError>>,
    },
    /// Ingest options outside the conversation (edit contexts)
    IngestOptions {
        chat_id: i64,
        text: String,
        reply: oneshot::Sender<Result<Vec<String>, RuntimeError>>,
    },
}

/// What happened to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandleOutcome {
    /// The poll was not waiting for this; nothing was sent
    Ignored,
    /// Transition applied and all effects ran
    Handled { poll: Poll },
    /// Input refused; `message` should be shown to the user
    Rejected { message: String },
}

/// Generic poll runtime that can work with any storage, transport and
/// lifecycle implementations
pub struct PollRuntime<S, T, L>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    poll_id: i64,
    storage: S,
    transport: Arc<T>,
    lifecycle: Arc<L>,
    request_rx: mpsc::Receiver<PollRequest>,
    idle_timeout: Duration,
}

impl<S, T, L> PollRuntime<S, T, L>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    pub fn new(
        poll_id: i64,
        storage: S,
        transport: Arc<T>,
        lifecycle: Arc<L>,
        request_rx: mpsc::Receiver<PollRequest>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            poll_id,
            storage,
            transport,
            lifecycle,
            request_rx,
            idle_timeout,
        }
    }

    /// Serve requests until every handle is dropped or the poll has been
    /// idle for `idle_timeout`.
    ///
    /// Stopping closes the channel first, so a request is either refused at
    /// send time or processed before the task exits.
    pub async fn run(mut self) {
        tracing::debug!(poll_id = self.poll_id, "Starting poll runtime");

        loop {
            match tokio::time::timeout(self.idle_timeout, self.request_rx.recv()).await {
                Ok(Some(request)) => self.process(request).await,
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!(poll_id = self.poll_id, "Poll runtime idle, stopping");
                    self.request_rx.close();
                    while let Some(request) = self.request_rx.recv().await {
                        self.process(request).await;
                    }
                    break;
                }
            }
        }

        tracing::debug!(poll_id = self.poll_id, "Poll runtime stopped");
    }

    async fn process(&self, request: PollRequest) {
        match request {
            PollRequest::Event {
                chat_id,
                event,
                reply,
            } => {
                let result = self.handle_event(chat_id, event).await;
                if let Err(e) = &result {
                    tracing::error!(poll_id = self.poll_id, error = %e, "Error handling event");
                }
                let _ = reply.send(result);
            }
            PollRequest::IngestOptions {
                chat_id,
                text,
                reply,
            } => {
                let result = self.ingest_options(chat_id, &text).await;
                if let Err(e) = &result {
                    tracing::error!(poll_id = self.poll_id, error = %e, "Error ingesting options");
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn load_poll(&self) -> Result<Poll, RuntimeError> {
        self.storage
            .get_poll(self.poll_id)
            .await
            .map_err(RuntimeError::Storage)?
            .ok_or(RuntimeError::PollNotFound(self.poll_id))
    }

    async fn handle_event(
        &self,
        chat_id: i64,
        event: Event,
    ) -> Result<HandleOutcome, RuntimeError> {
        let poll = self.load_poll().await?;
        let from = poll.expected_input;

        let result = match transition(&poll, event) {
            Ok(result) => result,
            Err(e) if e.is_silent() => {
                tracing::debug!(poll_id = poll.id, "Ignoring input, poll is not waiting for any");
                return Ok(HandleOutcome::Ignored);
            }
            Err(e) => {
                tracing::debug!(poll_id = poll.id, state = %from, error = %e, "Input rejected");
                return Ok(HandleOutcome::Rejected {
                    message: e.to_string(),
                });
            }
        };

        tracing::info!(
            poll_id = poll.id,
            from = %from,
            to = %result.poll.expected_input,
            "Poll transition"
        );

        let poll = self.apply(chat_id, &poll, result).await?;
        Ok(HandleOutcome::Handled { poll })
    }

    async fn ingest_options(&self, chat_id: i64, text: &str) -> Result<Vec<String>, RuntimeError> {
        let poll = self.load_poll().await?;
        let (result, added) = ingest_and_reconcile(&poll, text);
        tracing::info!(poll_id = poll.id, added = added.len(), "Ingested options");
        self.apply(chat_id, &poll, result).await?;
        Ok(added)
    }

    /// Execute effects in order, stopping at the first failure.
    ///
    /// A failed finalize puts `previous` back so the user can resend.
    async fn apply(
        &self,
        chat_id: i64,
        previous: &Poll,
        result: TransitionResult,
    ) -> Result<Poll, RuntimeError> {
        let TransitionResult { mut poll, effects } = result;

        for effect in effects {
            match effect {
                Effect::PersistPoll => {
                    self.storage
                        .save_poll(&poll)
                        .await
                        .map_err(RuntimeError::Storage)?;
                }
                Effect::SendMessage(message) => {
                    self.transport.send_message(chat_id, &message).await?;
                }
                Effect::FinalizePoll => match self.lifecycle.finalize(&poll, chat_id).await {
                    Ok(created) => poll = created,
                    Err(e) => {
                        self.restore(previous).await;
                        return Err(RuntimeError::Lifecycle(e));
                    }
                },
                Effect::ReconcileAdminView { listing } => {
                    self.reconcile(chat_id, &poll, &listing).await?;
                }
            }
        }

        Ok(poll)
    }

    async fn restore(&self, previous: &Poll) {
        match self.storage.save_poll(previous).await {
            Ok(()) => tracing::info!(
                poll_id = previous.id,
                state = %previous.expected_input,
                "Finalize failed, restored poll"
            ),
            Err(e) => tracing::error!(
                poll_id = previous.id,
                error = %e,
                "Failed to restore poll after finalize error"
            ),
        }
    }

    /// Re-send the admin listing, move the admin reference to it, then
    /// refresh published copies.
    ///
    /// If the reference swap fails the previous reference stays in place and
    /// published copies are left alone.
    async fn reconcile(
        &self,
        chat_id: i64,
        poll: &Poll,
        listing: &OutgoingMessage,
    ) -> Result<(), RuntimeError> {
        let message_id = self.transport.send_message(chat_id, listing).await?;

        self.storage
            .replace_admin_reference(poll.id, chat_id, message_id)
            .await
            .map_err(RuntimeError::Storage)?;

        self.lifecycle
            .refresh(poll)
            .await
            .map_err(RuntimeError::Lifecycle)?;

        tracing::debug!(poll_id = poll.id, chat_id, message_id, "Reconciled admin view");
        Ok(())
    }
}
