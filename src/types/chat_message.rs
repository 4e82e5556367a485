use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Role of a single conversation turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions that frame the conversation.
    System,

    /// A turn written by the end user.
    User,

    /// A turn previously produced by the model.
    Assistant,
}

impl ChatRole {
    /// The canonical wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a role after trimming surrounding whitespace and lowercasing it.
impl FromStr for ChatRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(ChatRole::System),
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            _ => Err(Error::invalid_role(s)),
        }
    }
}

impl<'de> Deserialize<'de> for ChatRole {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single conversation turn.
///
/// Messages are validated on construction and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    role: ChatRole,
    content: String,
}

impl ChatMessage {
    /// Create a message from a free-form role string.
    ///
    /// The role is trimmed and lowercased before validation; anything other
    /// than `system`, `user` or `assistant` fails with [`Error::InvalidRole`].
    pub fn new(role: &str, content: impl Into<String>) -> Result<Self> {
        Ok(Self::with_role(role.parse()?, content))
    }

    /// Create a message from an already-validated role.
    pub fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    /// The role of this turn.
    pub fn role(&self) -> ChatRole {
        self.role
    }

    /// The text of this turn.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Convert a `{"messages": [{"role": .., "content": ..}, ..]}` document into
/// conversation turns.
///
/// A document without a `messages` key yields an empty conversation.  Entries
/// missing a string `role` or `content` fail with a validation error, and an
/// unknown role fails with [`Error::InvalidRole`].
pub fn messages_from_json(data: &Value) -> Result<Vec<ChatMessage>> {
    let Some(messages) = data.get("messages") else {
        return Ok(Vec::new());
    };
    let Some(messages) = messages.as_array() else {
        return Err(Error::validation(
            "messages must be an array",
            Some("messages".to_string()),
        ));
    };
    messages
        .iter()
        .enumerate()
        .map(|(idx, message)| {
            let role = message.get("role").and_then(Value::as_str).ok_or_else(|| {
                Error::validation(
                    "message role must be a string",
                    Some(format!("messages[{idx}].role")),
                )
            })?;
            let content = message
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::validation(
                        "message content must be a string",
                        Some(format!("messages[{idx}].content")),
                    )
                })?;
            ChatMessage::new(role, content)
        })
        .collect()
}
