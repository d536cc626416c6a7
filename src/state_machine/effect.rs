//! Effects produced by state transitions

use crate::transport::OutgoingMessage;

/// Effects to be executed after state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist the poll: fields, expected input and newly appended options
    PersistPoll,

    /// Send a message to the chat the event came from
    SendMessage(OutgoingMessage),

    /// Hand the completed poll to the lifecycle collaborator
    FinalizePoll,

    /// Send the option listing, swap the admin reference for it and refresh
    /// every published copy of the poll
    ReconcileAdminView { listing: OutgoingMessage },
}

impl Effect {
    pub fn send(message: OutgoingMessage) -> Self {
        Effect::SendMessage(message)
    }

    pub fn reconcile(listing: OutgoingMessage) -> Self {
        Effect::ReconcileAdminView { listing }
    }
}
