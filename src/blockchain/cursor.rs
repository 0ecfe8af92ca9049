use std::collections::HashSet;
use tokio::sync::Mutex;

/// Hands out block numbers to workers exactly once.
///
/// Blocks flagged as missing are served before sequential progress. The
/// order in which missing blocks come back is unspecified.
pub struct BlockCursor {
    state: Mutex<CursorState>,
}

struct CursorState {
    next: u64,
    end: u64,
    // Set once `end` has been handed out when `end == u64::MAX`.
    sequential_done: bool,
    missing: HashSet<u64>,
}

impl BlockCursor {
    /// Sequential range `[start, end]`. An empty range when `start > end`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            state: Mutex::new(CursorState {
                next: start,
                end,
                sequential_done: false,
                missing: HashSet::new(),
            }),
        }
    }

    /// The next block to index, or `None` when no work remains.
    pub async fn next(&self) -> Option<u64> {
        let mut state = self.state.lock().await;

        if let Some(block) = state.missing.iter().next().copied() {
            state.missing.remove(&block);
            return Some(block);
        }

        if state.sequential_done || state.next > state.end {
            return None;
        }

        let block = state.next;
        match block.checked_add(1) {
            Some(next) => state.next = next,
            None => state.sequential_done = true,
        }
        Some(block)
    }

    pub async fn add_missing<I>(&self, blocks: I)
    where
        I: IntoIterator<Item = u64>,
    {
        let mut state = self.state.lock().await;
        state.missing.extend(blocks);
    }

    pub async fn is_exhausted(&self) -> bool {
        let state = self.state.lock().await;
        state.missing.is_empty() && (state.sequential_done || state.next > state.end)
    }
}
