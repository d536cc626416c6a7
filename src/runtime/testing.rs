//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::RuntimeManager;
use crate::db::{Poll, Reference, ReferenceKind, VoteType};
use crate::lifecycle::PublishingLifecycle;
use crate::transport::{OutgoingMessage, TransportError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-Memory Storage
// ============================================================================

#[derive(Default)]
struct StorageState {
    polls: HashMap<i64, Poll>,
    current: HashMap<i64, i64>,
    references: Vec<Reference>,
    next_poll_id: i64,
    next_reference_id: i64,
}

/// In-memory storage for testing
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<StorageState>>,
    fail_reference_replace: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `replace_admin_reference` fail, leaving references untouched
    pub fn fail_reference_replace(&self, fail: bool) {
        self.fail_reference_replace.store(fail, Ordering::SeqCst);
    }

    /// Insert a poll as is, assigning it an id
    pub fn seed_poll(&self, mut poll: Poll) -> Poll {
        let mut state = self.state.lock().unwrap();
        state.next_poll_id += 1;
        poll.id = state.next_poll_id;
        state.polls.insert(poll.id, poll.clone());
        poll
    }

    pub fn poll(&self, poll_id: i64) -> Option<Poll> {
        self.state.lock().unwrap().polls.get(&poll_id).cloned()
    }

    pub fn references(&self, poll_id: i64) -> Vec<Reference> {
        self.state
            .lock()
            .unwrap()
            .references
            .iter()
            .filter(|r| r.poll_id == poll_id)
            .cloned()
            .collect()
    }

    pub fn admin_references(&self, poll_id: i64, chat_id: i64) -> Vec<Reference> {
        self.references(poll_id)
            .into_iter()
            .filter(|r| r.kind == ReferenceKind::Admin && r.chat_id == chat_id)
            .collect()
    }

    fn push_reference(
        state: &mut StorageState,
        poll_id: i64,
        kind: ReferenceKind,
        chat_id: i64,
        message_id: i64,
    ) -> Reference {
        state.next_reference_id += 1;
        let reference = Reference {
            id: state.next_reference_id,
            poll_id,
            kind,
            chat_id,
            message_id,
            created_at: Utc::now(),
        };
        state.references.push(reference.clone());
        reference
    }
}

#[async_trait]
impl PollStore for InMemoryStorage {
    async fn create_poll(&self, user_id: i64, vote_type: VoteType) -> Result<Poll, String> {
        Ok(self.seed_poll(Poll::draft(0, user_id, vote_type)))
    }

    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, String> {
        Ok(self.poll(poll_id))
    }

    async fn save_poll(&self, poll: &Poll) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        match state.polls.get_mut(&poll.id) {
            Some(stored) => {
                *stored = poll.clone();
                Ok(())
            }
            None => Err(format!("Poll not found: {}", poll.id)),
        }
    }
}

#[async_trait]
impl UserStore for InMemoryStorage {
    async fn set_current_poll(&self, user_id: i64, poll_id: Option<i64>) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        match poll_id {
            Some(id) => state.current.insert(user_id, id),
            None => state.current.remove(&user_id),
        };
        Ok(())
    }

    async fn current_poll(&self, user_id: i64) -> Result<Option<i64>, String> {
        Ok(self.state.lock().unwrap().current.get(&user_id).copied())
    }
}

#[async_trait]
impl ReferenceStore for InMemoryStorage {
    async fn replace_admin_reference(
        &self,
        poll_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Reference, String> {
        if self.fail_reference_replace.load(Ordering::SeqCst) {
            return Err("reference replace failed".to_string());
        }

        let mut state = self.state.lock().unwrap();
        if !state.polls.contains_key(&poll_id) {
            return Err(format!("Poll not found: {poll_id}"));
        }
        state.references.retain(|r| {
            !(r.poll_id == poll_id && r.chat_id == chat_id && r.kind == ReferenceKind::Admin)
        });
        Ok(Self::push_reference(
            &mut state,
            poll_id,
            ReferenceKind::Admin,
            chat_id,
            message_id,
        ))
    }

    async fn add_reference(
        &self,
        poll_id: i64,
        kind: ReferenceKind,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Reference, String> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::push_reference(
            &mut state, poll_id, kind, chat_id, message_id,
        ))
    }

    async fn list_references(&self, poll_id: i64) -> Result<Vec<Reference>, String> {
        Ok(self.references(poll_id))
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub message: OutgoingMessage,
}

/// Mock transport that records everything and hands out increasing ids
#[allow(dead_code)]
pub struct MockTransport {
    next_message_id: AtomicI64,
    delay: Option<Duration>,
    unchanged_messages: Mutex<HashSet<i64>>,
    failing_messages: Mutex<HashSet<i64>>,
    failing_sends: AtomicBool,
    pub sent: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<SentMessage>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(100),
            delay: None,
            unchanged_messages: Mutex::new(HashSet::new()),
            failing_messages: Mutex::new(HashSet::new()),
            failing_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before every send, widening race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Edits of `message_id` report "message is not modified"
    pub fn unchanged(&self, message_id: i64) {
        self.unchanged_messages.lock().unwrap().insert(message_id);
    }

    /// Edits of `message_id` fail
    pub fn failing(&self, message_id: i64) {
        self.failing_messages.lock().unwrap().insert(message_id);
    }

    /// Make every send fail until switched back
    pub fn set_sends_failing(&self, failing: bool) {
        self.failing_sends.store(failing, Ordering::SeqCst);
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_messages()
            .into_iter()
            .map(|m| m.message.text)
            .collect()
    }

    pub fn last_sent(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn recorded_edits(&self) -> Vec<SentMessage> {
        self.edits.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<i64, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_sends.load(Ordering::SeqCst) {
            return Err(TransportError::network("connection reset"));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            message: message.clone(),
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        if self.unchanged_messages.lock().unwrap().contains(&message_id) {
            return Err(TransportError::not_modified(
                "Bad Request: message is not modified",
            ));
        }
        if self.failing_messages.lock().unwrap().contains(&message_id) {
            return Err(TransportError::api("Bad Request: message to edit not found"));
        }
        self.edits.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            message: message.clone(),
        });
        Ok(())
    }
}

// ============================================================================
// Test Harness
// ============================================================================

pub type TestManager =
    RuntimeManager<InMemoryStorage, MockTransport, PublishingLifecycle<InMemoryStorage, MockTransport>>;

/// Manager wired to in-memory storage and a recording transport
pub struct TestRuntime {
    pub manager: TestManager,
    pub storage: InMemoryStorage,
    pub transport: Arc<MockTransport>,
}

#[allow(dead_code)]
impl TestRuntime {
    pub fn new() -> Self {
        Self::with_transport(MockTransport::new())
    }

    pub fn with_transport(transport: MockTransport) -> Self {
        let storage = InMemoryStorage::new();
        let transport = Arc::new(transport);
        let lifecycle = PublishingLifecycle::new(storage.clone(), transport.clone());
        let manager = RuntimeManager::new(storage.clone(), transport.clone(), lifecycle);
        Self {
            manager,
            storage,
            transport,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.manager = self.manager.with_idle_timeout(idle_timeout);
        self
    }

    /// Seed a finalized poll with the given options
    pub fn created_poll(&self, user_id: i64, options: &[&str]) -> Poll {
        let mut poll = Poll::draft(0, user_id, VoteType::SingleVote);
        poll.name = Some("Colors".to_string());
        poll.description = Some("Pick one".to_string());
        poll.options = options
            .iter()
            .map(|o| crate::db::PollOption::new(*o))
            .collect();
        poll.expected_input = crate::db::ExpectedInput::Nothing;
        poll.created = true;
        self.storage.seed_poll(poll)
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ExpectedInput;
    use crate::runtime::{HandleOutcome, RuntimeError};

    const USER: i64 = 42;
    const CHAT: i64 = 42;

    fn handled_poll(outcome: HandleOutcome) -> Poll {
        match outcome {
            HandleOutcome::Handled { poll } => poll,
            other => panic!("expected Handled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        let poll = storage.create_poll(1, VoteType::Doodle).await.unwrap();

        storage.set_current_poll(1, Some(poll.id)).await.unwrap();
        assert_eq!(storage.current_poll(1).await.unwrap(), Some(poll.id));

        storage.replace_admin_reference(poll.id, 5, 1).await.unwrap();
        storage.replace_admin_reference(poll.id, 5, 2).await.unwrap();
        assert_eq!(storage.admin_references(poll.id, 5).len(), 1);
    }

    #[tokio::test]
    async fn test_single_vote_creation_flow() {
        let rt = TestRuntime::new();

        let poll = rt
            .manager
            .start_poll(USER, CHAT, VoteType::SingleVote)
            .await
            .unwrap();
        assert_eq!(rt.manager.storage().current_poll(USER).await.unwrap(), Some(poll.id));

        rt.manager.handle_user_text(USER, CHAT, "Lunch").await.unwrap();
        rt.manager
            .handle_user_text(USER, CHAT, "Where do we eat?")
            .await
            .unwrap();
        let after_options = handled_poll(
            rt.manager
                .handle_user_text(USER, CHAT, "Pizza\nSushi\nPizza")
                .await
                .unwrap(),
        );
        assert_eq!(after_options.option_names(), vec!["Pizza", "Sushi"]);
        assert_eq!(after_options.expected_input, ExpectedInput::Options);

        let done = handled_poll(rt.manager.finish_options(poll.id, CHAT).await.unwrap());

        assert!(done.created);
        assert_eq!(done.expected_input, ExpectedInput::Nothing);
        let stored = rt.storage.poll(poll.id).unwrap();
        assert!(stored.created);

        // The poll message became the admin view
        let admin = rt.storage.admin_references(poll.id, CHAT);
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].message_id, rt.transport.last_sent().unwrap().message_id);
    }

    #[tokio::test]
    async fn test_limited_vote_count_validation() {
        let rt = TestRuntime::new();
        let poll = rt
            .manager
            .start_poll(USER, CHAT, VoteType::LimitedVote)
            .await
            .unwrap();
        for text in ["Lunch", "Where?", "A\nB"] {
            rt.manager.handle_user_text(USER, CHAT, text).await.unwrap();
        }
        let waiting = handled_poll(rt.manager.finish_options(poll.id, CHAT).await.unwrap());
        assert_eq!(waiting.expected_input, ExpectedInput::VoteCount);

        let rejected = rt.manager.handle_user_text(USER, CHAT, "5").await.unwrap();
        assert_eq!(
            rejected,
            HandleOutcome::Rejected {
                message: "Please send me a number between 1 and 2".to_string()
            }
        );
        assert_eq!(
            rt.storage.poll(poll.id).unwrap().expected_input,
            ExpectedInput::VoteCount
        );

        let created = handled_poll(rt.manager.handle_user_text(USER, CHAT, "2").await.unwrap());
        assert_eq!(created.number_of_votes, Some(2));
        assert!(created.created);
    }

    #[tokio::test]
    async fn test_failed_finalize_can_be_retried() {
        let rt = TestRuntime::new();
        let mut draft = Poll::draft(0, USER, VoteType::SingleVote);
        draft.name = Some("Lunch".to_string());
        draft.options = vec![crate::db::PollOption::new("Pizza")];
        draft.expected_input = ExpectedInput::Options;
        let poll = rt.storage.seed_poll(draft);

        rt.transport.set_sends_failing(true);
        let result = rt.manager.finish_options(poll.id, CHAT).await;
        assert!(matches!(result, Err(RuntimeError::Lifecycle(_))));

        let stored = rt.storage.poll(poll.id).unwrap();
        assert_eq!(stored.expected_input, ExpectedInput::Options);
        assert!(!stored.created);

        rt.transport.set_sends_failing(false);
        let done = handled_poll(rt.manager.finish_options(poll.id, CHAT).await.unwrap());
        assert!(done.created);
        assert_eq!(rt.storage.admin_references(poll.id, CHAT).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_finalize_keeps_vote_count_pending() {
        let rt = TestRuntime::new();
        let mut draft = Poll::draft(0, USER, VoteType::CumulativeVote);
        draft.name = Some("Budget".to_string());
        draft.options = vec![crate::db::PollOption::new("A")];
        draft.expected_input = ExpectedInput::VoteCount;
        let poll = rt.storage.seed_poll(draft);

        rt.transport.set_sends_failing(true);
        assert!(rt.manager.handle_text(poll.id, CHAT, "3").await.is_err());
        let stored = rt.storage.poll(poll.id).unwrap();
        assert_eq!(stored.expected_input, ExpectedInput::VoteCount);
        assert_eq!(stored.number_of_votes, None);

        rt.transport.set_sends_failing(false);
        let created = handled_poll(rt.manager.handle_text(poll.id, CHAT, "3").await.unwrap());
        assert_eq!(created.number_of_votes, Some(3));
        assert!(created.created);
    }

    #[tokio::test]
    async fn test_text_without_pending_input_is_ignored() {
        let rt = TestRuntime::new();

        let outcome = rt.manager.handle_user_text(USER, CHAT, "hi").await.unwrap();
        assert_eq!(outcome, HandleOutcome::Ignored);

        let poll = rt.created_poll(USER, &["A"]);
        rt.manager
            .storage()
            .set_current_poll(USER, Some(poll.id))
            .await
            .unwrap();

        let outcome = rt.manager.handle_user_text(USER, CHAT, "hi").await.unwrap();
        assert_eq!(outcome, HandleOutcome::Ignored);
        assert!(rt.transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_new_option_round_reconciles_admin_view() {
        let rt = TestRuntime::new();
        let poll = rt.created_poll(USER, &["Red", "Blue"]);
        rt.storage.replace_admin_reference(poll.id, CHAT, 1).await.unwrap();
        rt.storage
            .add_reference(poll.id, ReferenceKind::Published, -500, 9)
            .await
            .unwrap();

        let outcome = rt.manager.begin_new_option(USER, poll.id, CHAT).await.unwrap();
        assert_eq!(handled_poll(outcome).expected_input, ExpectedInput::NewOption);

        let updated = handled_poll(
            rt.manager
                .handle_user_text(USER, CHAT, "Blue\nGreen\n\nGreen")
                .await
                .unwrap(),
        );

        assert_eq!(updated.option_names(), vec!["Red", "Blue", "Green"]);
        assert_eq!(updated.expected_input, ExpectedInput::Nothing);

        let texts = rt.transport.sent_texts();
        assert!(texts.contains(&"Options have been added:\n\n*Green*".to_string()));

        // Exactly one admin view, pointing at the freshly sent listing
        let listing = rt.transport.last_sent().unwrap();
        assert!(listing.message.text.ends_with("3. Green"));
        let admin = rt.storage.admin_references(poll.id, CHAT);
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].message_id, listing.message_id);

        let edits = rt.transport.recorded_edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].message_id, 9);
        assert!(edits[0].message.text.contains("• Green"));
    }

    #[tokio::test]
    async fn test_new_option_round_without_additions() {
        let rt = TestRuntime::new();
        let poll = rt.created_poll(USER, &["Red"]);

        rt.manager.begin_new_option(USER, poll.id, CHAT).await.unwrap();
        let updated = handled_poll(rt.manager.handle_user_text(USER, CHAT, "Red").await.unwrap());

        assert_eq!(updated.expected_input, ExpectedInput::Nothing);
        assert!(rt
            .transport
            .sent_texts()
            .contains(&"No new option has been added".to_string()));
        assert_eq!(rt.storage.admin_references(poll.id, CHAT).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reference_replace_keeps_old_reference() {
        let rt = TestRuntime::new();
        let poll = rt.created_poll(USER, &["Red"]);
        rt.storage.replace_admin_reference(poll.id, CHAT, 1).await.unwrap();
        rt.storage
            .add_reference(poll.id, ReferenceKind::Published, -500, 9)
            .await
            .unwrap();
        rt.storage.fail_reference_replace(true);

        let result = rt.manager.ingest_options_now(poll.id, CHAT, "Green").await;

        assert!(matches!(result, Err(RuntimeError::Storage(_))));
        let admin = rt.storage.admin_references(poll.id, CHAT);
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].message_id, 1);
        assert!(rt.transport.recorded_edits().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_tolerates_unchanged_and_failing_copies() {
        let rt = TestRuntime::new();
        let poll = rt.created_poll(USER, &["Red"]);
        for message_id in [7, 8, 9] {
            rt.storage
                .add_reference(poll.id, ReferenceKind::Published, -500, message_id)
                .await
                .unwrap();
        }
        rt.transport.unchanged(7);
        rt.transport.failing(8);

        let added = rt
            .manager
            .ingest_options_now(poll.id, CHAT, "Green")
            .await
            .unwrap();

        assert_eq!(added, vec!["Green"]);
        let edited: Vec<_> = rt
            .transport
            .recorded_edits()
            .iter()
            .map(|e| e.message_id)
            .collect();
        assert_eq!(edited, vec![9]);
    }

    #[tokio::test]
    async fn test_ingest_now_keeps_expected_input() {
        let rt = TestRuntime::new();
        let poll = rt
            .manager
            .start_poll(USER, CHAT, VoteType::SingleVote)
            .await
            .unwrap();
        rt.manager.handle_user_text(USER, CHAT, "Lunch").await.unwrap();
        rt.manager.handle_user_text(USER, CHAT, "Where?").await.unwrap();

        let added = rt
            .manager
            .ingest_options_now(poll.id, CHAT, "A\nB")
            .await
            .unwrap();

        assert_eq!(added, vec!["A", "B"]);
        assert_eq!(
            rt.storage.poll(poll.id).unwrap().expected_input,
            ExpectedInput::Options
        );
    }

    #[tokio::test]
    async fn test_begin_new_option_on_draft_is_rejected() {
        let rt = TestRuntime::new();
        let draft = rt
            .manager
            .start_poll(USER, CHAT, VoteType::SingleVote)
            .await
            .unwrap();
        let other = rt.created_poll(USER, &["A"]);
        rt.manager
            .storage()
            .set_current_poll(USER, Some(other.id))
            .await
            .unwrap();

        let outcome = rt.manager.begin_new_option(USER, draft.id, CHAT).await.unwrap();

        assert!(matches!(outcome, HandleOutcome::Rejected { .. }));
        assert_eq!(
            rt.manager.storage().current_poll(USER).await.unwrap(),
            Some(other.id)
        );
    }

    #[tokio::test]
    async fn test_unknown_poll() {
        let rt = TestRuntime::new();
        let result = rt.manager.finish_options(999, CHAT).await;
        assert!(matches!(result, Err(RuntimeError::PollNotFound(999))));
    }

    #[tokio::test]
    async fn test_idle_runtime_stops_and_restarts() {
        let rt = TestRuntime::new().with_idle_timeout(Duration::from_millis(20));
        let mut draft = Poll::draft(0, USER, VoteType::SingleVote);
        draft.name = Some("Idle".to_string());
        draft.expected_input = ExpectedInput::Options;
        let poll = rt.storage.seed_poll(draft);

        handled_poll(rt.manager.handle_text(poll.id, CHAT, "A").await.unwrap());
        assert_eq!(rt.manager.running_runtimes().await, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rt.manager.running_runtimes().await, 0);

        let again = handled_poll(rt.manager.handle_text(poll.id, CHAT, "B").await.unwrap());
        assert_eq!(again.option_names(), vec!["A", "B"]);
        assert_eq!(rt.manager.running_runtimes().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_messages_for_one_poll_are_serialized() {
        let rt = TestRuntime::with_transport(
            MockTransport::new().with_delay(Duration::from_millis(20)),
        );
        let mut draft = Poll::draft(0, USER, VoteType::SingleVote);
        draft.name = Some("Race".to_string());
        draft.expected_input = ExpectedInput::Options;
        let poll = rt.storage.seed_poll(draft);

        let (first, second) = tokio::join!(
            rt.manager.handle_text(poll.id, CHAT, "A"),
            rt.manager.handle_text(poll.id, CHAT, "B"),
        );
        handled_poll(first.unwrap());
        handled_poll(second.unwrap());

        let mut names: Vec<String> = rt
            .storage
            .poll(poll.id)
            .unwrap()
            .options
            .into_iter()
            .map(|o| o.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
    }
}
