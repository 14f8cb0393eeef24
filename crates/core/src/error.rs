//! Core error types

use thiserror::Error;

use crate::corpus::CorpusVersion;

/// Errors shared across the retrieval core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Index error: {0}")]
    Index(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Corpus version mismatch: index holds {expected}, query asked for {actual}")]
    VersionMismatch {
        expected: CorpusVersion,
        actual: CorpusVersion,
    },

    #[error("Stale corpus version: {new} is not newer than installed {current}")]
    StaleVersion {
        current: CorpusVersion,
        new: CorpusVersion,
    },

    #[error("No corpus installed")]
    NoCorpus,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
