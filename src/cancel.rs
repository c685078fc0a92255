//! Generation tokens for superseding in-flight searches.
//!
//! Every search takes a fresh generation from its corpus' tracker. A newer
//! search (or an explicit cancel) moves the active generation forward, and any
//! token minted for an older generation reports itself as cancelled.
//!
//! ## Sparse Checking
//!
//! For loops over large shards, `is_cancelled_sparse()` only checks every
//! 4,096 iterations to keep atomic reads off the hot path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How often matching loops check whether their generation was superseded.
/// Using a power of 2 allows efficient modulo via bitwise AND.
pub const CANCEL_CHECK_INTERVAL: usize = 0x1000; // 4,096

/// Tracks the live generation for one corpus.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    active: Arc<AtomicU64>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation and returns a token bound to it.
    ///
    /// This effectively cancels every in-flight search holding an older token.
    pub fn next_token(&self) -> CancellationToken {
        let generation = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        CancellationToken {
            active: Some(self.active.clone()),
            generation,
        }
    }

    /// Marks the current generation stale without starting a new search.
    ///
    /// Safe to call when nothing is in flight.
    pub fn cancel(&self) -> u64 {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current live generation without incrementing.
    pub fn current(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// A token identifying one search generation.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    /// Shared active generation; `None` for tokens that are never cancelled.
    active: Option<Arc<AtomicU64>>,
    generation: u64,
}

impl CancellationToken {
    /// Creates a cancellation token that is never cancelled.
    ///
    /// Useful for tests and for build-time callers that should not be interruptible.
    pub fn noop() -> Self {
        Self {
            active: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks if this token is still live.
    ///
    /// Returns `Some(())` if live, `None` if superseded, so callers can bail
    /// out with `?` inside functions returning `Option`.
    #[inline]
    pub fn ensure_live(&self) -> Option<()> {
        if self.is_cancelled() {
            None
        } else {
            Some(())
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.active {
            Some(active) => active.load(Ordering::Relaxed) != self.generation,
            None => false,
        }
    }

    /// Sparse liveness check - only looks at the shared generation every
    /// `CANCEL_CHECK_INTERVAL` iterations.
    #[inline]
    pub fn ensure_live_sparse(&self, counter: usize) -> Option<()> {
        if counter & (CANCEL_CHECK_INTERVAL - 1) == 0 {
            self.ensure_live()
        } else {
            Some(())
        }
    }
}

impl Default for CancellationToken {
    /// Default creates a noop token that is never cancelled.
    fn default() -> Self {
        Self::noop()
    }
}
