//! Versioned corpus store
//!
//! Holds the currently installed [`CorpusSnapshot`]. Readers clone the `Arc`
//! and keep using that snapshot for as long as they like; a rebuild installs
//! a whole new snapshot in one swap, so nobody ever observes a half-built
//! index.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::corpus::{Corpus, CorpusVersion};
use crate::error::{Error, Result};
use crate::traits::{LexicalIndex, SemanticIndex};

/// Immutable corpus plus the indexes built from it
#[derive(Clone)]
pub struct CorpusSnapshot {
    corpus: Arc<Corpus>,
    lexical: Arc<dyn LexicalIndex>,
    semantic: Arc<dyn SemanticIndex>,
}

impl CorpusSnapshot {
    /// Bundle a corpus with its indexes; all three must share a version
    pub fn new(
        corpus: Arc<Corpus>,
        lexical: Arc<dyn LexicalIndex>,
        semantic: Arc<dyn SemanticIndex>,
    ) -> Result<Self> {
        let version = corpus.version();
        lexical.check_version(version)?;
        semantic.check_version(version)?;

        Ok(Self {
            corpus,
            lexical,
            semantic,
        })
    }

    pub fn version(&self) -> CorpusVersion {
        self.corpus.version()
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn lexical(&self) -> &Arc<dyn LexicalIndex> {
        &self.lexical
    }

    pub fn semantic(&self) -> &Arc<dyn SemanticIndex> {
        &self.semantic
    }
}

impl std::fmt::Debug for CorpusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusSnapshot")
            .field("version", &self.version())
            .field("chunks", &self.corpus.len())
            .finish()
    }
}

struct Installed {
    snapshot: Arc<CorpusSnapshot>,
    source_hashes: BTreeSet<String>,
}

/// Read-mostly holder of the current corpus version
#[derive(Default)]
pub struct CorpusStore {
    current: RwLock<Option<Installed>>,
}

impl CorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently installed snapshot
    pub fn current(&self) -> Option<Arc<CorpusSnapshot>> {
        self.current.read().as_ref().map(|i| Arc::clone(&i.snapshot))
    }

    /// Current snapshot, or `Error::NoCorpus`
    pub fn require_current(&self) -> Result<Arc<CorpusSnapshot>> {
        self.current().ok_or(Error::NoCorpus)
    }

    pub fn current_version(&self) -> Option<CorpusVersion> {
        self.current.read().as_ref().map(|i| i.snapshot.version())
    }

    /// Version a new build should use
    pub fn next_version(&self) -> CorpusVersion {
        self.current_version().unwrap_or_default().next()
    }

    /// Content hashes of the source files behind the current version
    pub fn source_hashes(&self) -> BTreeSet<String> {
        self.current
            .read()
            .as_ref()
            .map(|i| i.source_hashes.clone())
            .unwrap_or_default()
    }

    /// True when `hashes` describes exactly the installed source files
    pub fn matches_sources(&self, hashes: &BTreeSet<String>) -> bool {
        self.current
            .read()
            .as_ref()
            .map(|i| &i.source_hashes == hashes)
            .unwrap_or(false)
    }

    /// Atomically install a new snapshot.
    ///
    /// The new version must be strictly greater than the installed one.
    pub fn install(
        &self,
        snapshot: CorpusSnapshot,
        source_hashes: BTreeSet<String>,
    ) -> Result<CorpusVersion> {
        let mut current = self.current.write();
        let new = snapshot.version();

        if let Some(installed) = current.as_ref() {
            let installed_version = installed.snapshot.version();
            if new <= installed_version {
                return Err(Error::StaleVersion {
                    current: installed_version,
                    new,
                });
            }
        }

        tracing::info!(
            version = %new,
            chunks = snapshot.corpus().len(),
            "Installed corpus version"
        );

        *current = Some(Installed {
            snapshot: Arc::new(snapshot),
            source_hashes,
        });
        Ok(new)
    }
}
