//! Poll creation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! every inbound message becomes an [`Event`], [`transition`] computes the
//! next poll plus the [`Effect`]s the runtime must carry out.

mod effect;
pub mod event;
pub mod ingest;
pub mod state;
pub(crate) mod transition;
pub mod vote_count;


pub use effect::Effect;
pub use event::Event;
pub use ingest::ingest_options;
pub use state::ExpectedInput;
pub use transition::{ingest_and_reconcile, transition, TransitionError, TransitionResult};
pub use vote_count::{validate_vote_count, VoteCountError};
