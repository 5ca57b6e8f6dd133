//! Last-writer-wins merge decisions.
//!
//! Cells are independent: a decision only ever compares an incoming
//! message against the latest timestamp recorded for the same cell. The
//! packed HLC carries the node as its final tie-break, so exact ties occur
//! only for byte-identical timestamps and the existing value wins.

use crate::clock::compare_packed;
use std::cmp::Ordering;

/// Outcome of merging one message into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message is newer than the cell; the view takes its value.
    Applied,
    /// The message is stale or a tie; the log keeps it, the view does not.
    Skipped,
}

/// Decide whether an incoming message wins its cell.
///
/// `incoming` is the message's packed timestamp; `current` is the latest
/// packed timestamp recorded for the cell, or `None` for an empty cell.
/// Malformed timestamps compare strictly less than every valid one, so a
/// malformed incoming message never overwrites a valid cell.
pub fn decide(incoming: &str, current: Option<&str>) -> MergeOutcome {
    match current {
        None => MergeOutcome::Applied,
        Some(current) => match compare_packed(incoming, current) {
            Ordering::Greater => MergeOutcome::Applied,
            _ => MergeOutcome::Skipped,
        },
    }
}
