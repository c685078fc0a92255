//! Keystroke-driven sessions that deliver live results to a presenter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::manager::SymbolSearchManager;
use crate::corpus::CorpusId;
use crate::error::SearchError;
use crate::types::SearchResult;

/// Receives the results of live searches. Implemented by the embedding UI.
pub trait Presenter: Send + Sync {
    fn present(&self, corpus: &CorpusId, result: SearchResult);
}

/// Binds one input stream to one corpus.
///
/// Each `submit` supersedes the previous one; a result is handed to the
/// presenter only if its generation is still live and newer than anything
/// already delivered.
pub struct QuerySession {
    manager: Arc<SymbolSearchManager>,
    corpus: CorpusId,
    presenter: Arc<dyn Presenter>,
    delivered: Arc<AtomicU64>,
}

impl std::fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySession")
            .field("corpus", &self.corpus)
            .field("delivered", &self.delivered.load(Ordering::Relaxed))
            .field("presenter", &"<presenter>")
            .finish()
    }
}

impl QuerySession {
    pub fn new(
        manager: Arc<SymbolSearchManager>,
        corpus: CorpusId,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self, SearchError> {
        manager.current_generation(&corpus)?;
        Ok(Self {
            manager,
            corpus,
            presenter,
            delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn corpus(&self) -> &CorpusId {
        &self.corpus
    }

    /// Starts a search for `query` on the current tokio runtime.
    ///
    /// The generation is taken before this returns, so submissions are
    /// ordered by call order regardless of task scheduling.
    pub fn submit(&self, query: &str) -> Result<JoinHandle<()>, SearchError> {
        let pending = self.manager.begin_search(&self.corpus, query)?;
        let manager = self.manager.clone();
        let presenter = self.presenter.clone();
        let delivered = self.delivered.clone();

        Ok(tokio::spawn(async move {
            let Some(result) = pending.run().await else {
                return;
            };
            let live = manager
                .current_generation(&result.corpus)
                .is_ok_and(|current| current == result.generation);
            if !live {
                log::debug!(
                    "dropping superseded result corpus={} generation={}",
                    result.corpus,
                    result.generation
                );
                return;
            }
            if delivered.fetch_max(result.generation, Ordering::SeqCst) >= result.generation {
                return;
            }
            let corpus = result.corpus.clone();
            presenter.present(&corpus, result);
        }))
    }

    /// Cancels the outstanding search, if any.
    pub fn cancel(&self) -> Result<u64, SearchError> {
        self.manager.cancel(&self.corpus)
    }
}
