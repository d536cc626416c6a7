//! Option ingestion
//!
//! Turns free text into new poll options: one option per line, trimmed,
//! blank lines dropped, exact duplicates (against the poll and against
//! earlier lines of the same text) skipped.

use crate::db::{Poll, PollOption};
use std::collections::HashSet;

/// Candidate option texts in submission order, before deduplication
pub fn option_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Append every new option in `text` to `poll`.
///
/// Returns the texts actually appended, in order. Nothing is reported for
/// blank or duplicate lines; the caller decides how to present an empty
/// result.
pub fn ingest_options(poll: &mut Poll, text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = poll.options.iter().map(|o| o.name.clone()).collect();
    let mut added = Vec::new();

    for candidate in option_lines(text) {
        if seen.insert(candidate.to_string()) {
            poll.options.push(PollOption::new(candidate));
            added.push(candidate.to_string());
        }
    }

    added
}
