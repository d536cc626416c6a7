//! Runtime for driving poll conversations
//!
//! Each poll gets its own runtime task fed through a channel, which gives
//! per-poll mutual exclusion without holding locks across chat I/O.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{HandleOutcome, PollRequest, PollRuntime};
pub use traits::*;

use crate::db::{Poll, Reference, VoteType};
use crate::display;
use crate::lifecycle::PublishingLifecycle;
use crate::state_machine::Event;
use crate::transport::{TelegramClient, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

/// How long a poll runtime waits for work before its task stops
const RUNTIME_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Type alias for the production manager with concrete implementations
pub type ProductionManager = RuntimeManager<
    DatabaseStorage,
    TelegramClient,
    PublishingLifecycle<DatabaseStorage, TelegramClient>,
>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Poll not found: {0}")]
    PollNotFound(i64),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
    #[error("Poll runtime is not running")]
    Closed,
}

/// Handle to interact with a running poll runtime
#[derive(Clone)]
pub struct PollHandle {
    pub request_tx: mpsc::Sender<PollRequest>,
}

impl PollHandle {
    fn is_running(&self) -> bool {
        !self.request_tx.is_closed()
    }
}

/// Manager for all poll runtimes
pub struct RuntimeManager<S, T, L>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    storage: S,
    transport: Arc<T>,
    lifecycle: Arc<L>,
    runtimes: RwLock<HashMap<i64, PollHandle>>,
    idle_timeout: Duration,
}

impl<S, T, L> RuntimeManager<S, T, L>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
    L: PollLifecycle + 'static,
{
    pub fn new(storage: S, transport: Arc<T>, lifecycle: L) -> Self {
        Self {
            storage,
            transport,
            lifecycle: Arc::new(lifecycle),
            runtimes: RwLock::new(HashMap::new()),
            idle_timeout: RUNTIME_IDLE_TIMEOUT,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Get or create the runtime for a poll
    pub async fn get_or_create(&self, poll_id: i64) -> Result<PollHandle, RuntimeError> {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(&poll_id) {
                if handle.is_running() {
                    return Ok(handle.clone());
                }
            }
        }

        if self
            .storage
            .get_poll(poll_id)
            .await
            .map_err(RuntimeError::Storage)?
            .is_none()
        {
            return Err(RuntimeError::PollNotFound(poll_id));
        }

        let mut runtimes = self.runtimes.write().await;

        // Another caller may have started it while we were checking storage
        if let Some(handle) = runtimes.get(&poll_id) {
            if handle.is_running() {
                return Ok(handle.clone());
            }
        }

        // Drop handles of runtimes that stopped while idle
        runtimes.retain(|_, handle| handle.is_running());

        let (request_tx, request_rx) = mpsc::channel(32);
        let runtime = PollRuntime::new(
            poll_id,
            self.storage.clone(),
            self.transport.clone(),
            self.lifecycle.clone(),
            request_rx,
            self.idle_timeout,
        );

        tokio::spawn(async move {
            runtime.run().await;
        });

        let handle = PollHandle { request_tx };
        runtimes.insert(poll_id, handle.clone());
        Ok(handle)
    }

    /// Start creating a poll for `user_id` and ask for its name
    pub async fn start_poll(
        &self,
        user_id: i64,
        chat_id: i64,
        vote_type: VoteType,
    ) -> Result<Poll, RuntimeError> {
        let poll = self
            .storage
            .create_poll(user_id, vote_type)
            .await
            .map_err(RuntimeError::Storage)?;

        self.storage
            .set_current_poll(user_id, Some(poll.id))
            .await
            .map_err(RuntimeError::Storage)?;

        self.transport
            .send_message(chat_id, &display::name_prompt(vote_type))
            .await?;

        tracing::info!(poll_id = poll.id, user_id, vote_type = %vote_type, "Started poll creation");
        Ok(poll)
    }

    /// Route a private text message to the poll its sender is working on
    pub async fn handle_user_text(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<HandleOutcome, RuntimeError> {
        let current = self
            .storage
            .current_poll(user_id)
            .await
            .map_err(RuntimeError::Storage)?;

        match current {
            Some(poll_id) => self.handle_text(poll_id, chat_id, text).await,
            None => Ok(HandleOutcome::Ignored),
        }
    }

    pub async fn handle_text(
        &self,
        poll_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<HandleOutcome, RuntimeError> {
        self.send_event(poll_id, chat_id, Event::text(text)).await
    }

    pub async fn finish_options(
        &self,
        poll_id: i64,
        chat_id: i64,
    ) -> Result<HandleOutcome, RuntimeError> {
        self.send_event(poll_id, chat_id, Event::FinishOptions).await
    }

    /// Start a `new_option` round; the user's next text goes to this poll
    pub async fn begin_new_option(
        &self,
        user_id: i64,
        poll_id: i64,
        chat_id: i64,
    ) -> Result<HandleOutcome, RuntimeError> {
        let outcome = self
            .send_event(poll_id, chat_id, Event::BeginNewOption)
            .await?;

        if matches!(outcome, HandleOutcome::Handled { .. }) {
            self.storage
                .set_current_poll(user_id, Some(poll_id))
                .await
                .map_err(RuntimeError::Storage)?;
        }
        Ok(outcome)
    }

    /// Ingest options and reconcile the admin view, bypassing the
    /// conversation state
    pub async fn ingest_options_now(
        &self,
        poll_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<Vec<String>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(
            poll_id,
            PollRequest::IngestOptions {
                chat_id,
                text: text.to_string(),
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| RuntimeError::Closed)?
    }

    async fn send_event(
        &self,
        poll_id: i64,
        chat_id: i64,
        event: Event,
    ) -> Result<HandleOutcome, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(
            poll_id,
            PollRequest::Event {
                chat_id,
                event,
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| RuntimeError::Closed)?
    }

    /// Queue a request on the poll's runtime.
    ///
    /// A runtime that stopped while idle refuses the send and hands the
    /// request back, so it is retried once on a fresh runtime.
    async fn submit(&self, poll_id: i64, mut request: PollRequest) -> Result<(), RuntimeError> {
        for _ in 0..2 {
            let handle = self.get_or_create(poll_id).await?;
            match handle.request_tx.send(request).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => request = returned,
            }
        }
        Err(RuntimeError::Closed)
    }

    /// Number of poll runtimes currently accepting work
    #[allow(dead_code)] // Used in tests
    pub async fn running_runtimes(&self) -> usize {
        self.runtimes
            .read()
            .await
            .values()
            .filter(|handle| handle.is_running())
            .count()
    }

    pub async fn poll(&self, poll_id: i64) -> Result<Poll, RuntimeError> {
        self.storage
            .get_poll(poll_id)
            .await
            .map_err(RuntimeError::Storage)?
            .ok_or(RuntimeError::PollNotFound(poll_id))
    }

    pub async fn references(&self, poll_id: i64) -> Result<Vec<Reference>, RuntimeError> {
        self.poll(poll_id).await?;
        self.storage
            .list_references(poll_id)
            .await
            .map_err(RuntimeError::Storage)
    }

    /// Get the storage handle
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}
