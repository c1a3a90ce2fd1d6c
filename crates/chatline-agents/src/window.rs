//! Bounds the conversation history handed to the provider.
//!
//! Two limits apply in sequence: a turn count, then a byte budget on the
//! serialized JSON array of the turns that remain. A long-but-terse chat
//! hits the first, a short-but-verbose one hits the second.

use chatline_common::Turn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub max_turns: usize,
    pub max_bytes: usize,
}

/// Length of `[` + `]` in a serialized array.
const ARRAY_BRACKETS: usize = 2;

impl HistoryWindow {
    pub fn new(max_turns: usize, max_bytes: usize) -> Self {
        Self {
            max_turns,
            max_bytes,
        }
    }

    /// Keep the newest suffix of `history` that satisfies both bounds.
    ///
    /// The walk stops at the first turn that would overflow the byte budget,
    /// so the result is always a contiguous suffix and applying the window
    /// twice changes nothing.
    pub fn optimize(&self, history: &[Turn]) -> Vec<Turn> {
        if history.is_empty() || self.max_turns == 0 {
            return Vec::new();
        }

        let recent = &history[history.len().saturating_sub(self.max_turns)..];

        let mut total = ARRAY_BRACKETS;
        let mut kept = 0;
        for turn in recent.iter().rev() {
            let separator = usize::from(kept > 0);
            let cost = serialized_len(turn).saturating_add(separator);
            if total.saturating_add(cost) > self.max_bytes {
                break;
            }
            total += cost;
            kept += 1;
        }

        recent[recent.len() - kept..].to_vec()
    }
}

fn serialized_len(turn: &Turn) -> usize {
    serde_json::to_vec(turn)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}
