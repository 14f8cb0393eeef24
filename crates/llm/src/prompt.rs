//! Prompt and message types
//!
//! Also hosts the lenient JSON extraction used to read structured replies
//! from chat models that wrap JSON in prose or code fences.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::LlmError;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single-turn prompt: optional system instructions plus user content
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.user.clone()));
        messages
    }
}

/// Parse the outermost `{...}` object in a model reply
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    parse_delimited(text, '{', '}')
}

/// Parse the outermost `[...]` array in a model reply
pub fn parse_json_array<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    parse_delimited(text, '[', ']')
}

fn parse_delimited<T: DeserializeOwned>(text: &str, open: char, close: char) -> Result<T, LlmError> {
    let start = text.find(open);
    let end = text.rfind(close);

    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&text[s..=e])
            .map_err(|err| LlmError::InvalidResponse(format!("malformed JSON: {}", err))),
        _ => Err(LlmError::InvalidResponse(format!(
            "no JSON {}...{} found in response",
            open, close
        ))),
    }
}

/// Truncate text to at most `max_chars` characters on a char boundary
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
