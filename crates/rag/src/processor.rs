//! Document processing
//!
//! Validates uploads, splits markdown on `#`/`##` headers and turns the
//! sections into chunks. Chunks with identical content are kept once
//! across the whole upload. Parsed sections are cached per file content
//! hash so re-uploads skip the split.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use docchat_config::IngestionConfig;
use docchat_core::{Chunk, CorpusVersion};

use crate::RagError;

const SHORT_HASH_LEN: usize = 12;

/// An uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Hex SHA-256 of the file content
    pub fn content_hash(&self) -> String {
        sha256_hex(self.content.as_bytes())
    }

    /// Lower-cased file extension, if any
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }
}

/// Header-delimited slice of a markdown document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header_path: String,
    pub text: String,
}

#[derive(Debug)]
struct CachedSections {
    sections: Vec<Section>,
    stored_at: Instant,
}

/// Upload validation and markdown chunking
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    max_total_bytes: usize,
    allowed_extensions: Vec<String>,
    cache_ttl: Duration,
    cache: Arc<Mutex<HashMap<String, CachedSections>>>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::from(&IngestionConfig::default())
    }
}

impl From<&IngestionConfig> for DocumentProcessor {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            max_total_bytes: config.max_total_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl DocumentProcessor {
    /// Reject empty or oversized uploads
    pub fn validate(&self, files: &[SourceFile]) -> Result<(), RagError> {
        if files.is_empty() {
            return Err(RagError::InvalidDocument("no documents uploaded".to_string()));
        }

        let size: usize = files.iter().map(|f| f.content.len()).sum();
        if size > self.max_total_bytes {
            return Err(RagError::UploadTooLarge {
                size,
                limit: self.max_total_bytes,
            });
        }

        Ok(())
    }

    pub fn is_supported(&self, file: &SourceFile) -> bool {
        file.extension()
            .map(|ext| self.allowed_extensions.contains(&ext))
            .unwrap_or(false)
    }

    /// Supported files from `files`; the rest are logged and dropped
    pub fn supported<'a>(&self, files: &'a [SourceFile]) -> Vec<&'a SourceFile> {
        files
            .iter()
            .filter(|f| {
                let ok = self.is_supported(f);
                if !ok {
                    tracing::warn!(file = %f.name, "Skipping unsupported file type");
                }
                ok
            })
            .collect()
    }

    /// Set the section cache lifetime; zero disables caching
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// True when sections for `content_hash` are cached and not expired
    pub fn is_cached(&self, content_hash: &str) -> bool {
        self.cache
            .lock()
            .get(content_hash)
            .map(|entry| entry.stored_at.elapsed() < self.cache_ttl)
            .unwrap_or(false)
    }

    pub fn cached_files(&self) -> usize {
        self.cache.lock().len()
    }

    /// Sections of `file`, from the cache when the content was seen before
    fn sections(&self, file: &SourceFile, hash: &str) -> Vec<Section> {
        if self.cache_ttl.is_zero() {
            return split_markdown(&file.content);
        }

        let mut cache = self.cache.lock();
        let ttl = self.cache_ttl;
        cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);

        if let Some(entry) = cache.get(hash) {
            tracing::debug!(file = %file.name, "Loading sections from cache");
            return entry.sections.clone();
        }

        let sections = split_markdown(&file.content);
        cache.insert(
            hash.to_string(),
            CachedSections {
                sections: sections.clone(),
                stored_at: Instant::now(),
            },
        );
        sections
    }

    /// Chunk every file for `version`, deduplicating identical content
    pub fn chunk_files(&self, version: CorpusVersion, files: &[&SourceFile]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut seen = HashSet::new();

        for file in files {
            let hash = file.content_hash();
            let short = &hash[..SHORT_HASH_LEN];

            for (sequence, section) in self.sections(file, &hash).into_iter().enumerate() {
                if !seen.insert(sha256_hex(section.text.as_bytes())) {
                    continue;
                }

                let id = format!("{}:{}:{}", version, short, sequence);
                chunks.push(
                    Chunk::new(id, section.text, file.name.clone())
                        .with_header_path(section.header_path)
                        .with_sequence_index(sequence),
                );
            }
        }

        tracing::info!(version = %version, files = files.len(), chunks = chunks.len(), "Chunked documents");
        chunks
    }
}

/// Split markdown into sections on level 1 and 2 headers.
///
/// Header lines are not part of the section text. A new `#` clears the
/// current `##`. Lines inside fenced code blocks are never headers.
pub fn split_markdown(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut h1: Option<String> = None;
    let mut h2: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            body.push(line);
            continue;
        }

        if !in_fence {
            if let Some(title) = header_title(trimmed, "# ") {
                flush(&mut body, h1.as_deref(), h2.as_deref(), &mut sections);
                h1 = Some(title);
                h2 = None;
                continue;
            }
            if let Some(title) = header_title(trimmed, "## ") {
                flush(&mut body, h1.as_deref(), h2.as_deref(), &mut sections);
                h2 = Some(title);
                continue;
            }
        }

        body.push(line);
    }
    flush(&mut body, h1.as_deref(), h2.as_deref(), &mut sections);

    sections
}

fn flush(body: &mut Vec<&str>, h1: Option<&str>, h2: Option<&str>, out: &mut Vec<Section>) {
    let text = body.join("\n").trim().to_string();
    body.clear();
    if text.is_empty() {
        return;
    }
    let header_path = [h1, h2].into_iter().flatten().collect::<Vec<_>>().join(" > ");
    out.push(Section { header_path, text });
}

fn header_title(line: &str, marker: &str) -> Option<String> {
    line.strip_prefix(marker)
        .map(|t| t.trim().trim_end_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
