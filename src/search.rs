//! Query-time search over registered corpora.
//!
//! This module handles the query side of the engine:
//! - Per-corpus loaders, caches and generation tracking
//! - Prefix/substring matching and ranking
//! - Narrowing of the previous match set when a query is extended
//! - Delivery of live results to a presenter

mod engine;
mod manager;
mod session;

// Re-export main types
pub use manager::{PendingSearch, SymbolSearchManager};
pub use session::{Presenter, QuerySession};
