//! Events that can occur while a poll is being assembled

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Trimmed text message from the poll's creator
    Text { text: String },

    // Keyboard actions
    /// "Done" pressed while options are being entered
    FinishOptions,
    /// "Add option" pressed on a created poll
    BeginNewOption,
}

impl Event {
    pub fn text(text: &str) -> Self {
        Event::Text {
            text: text.trim().to_string(),
        }
    }
}
