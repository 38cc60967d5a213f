//! Message and Conversation domain types.
//!
//! A conversation is the transcript shared between the caller and the turn
//! loop: user input, assistant replies (optionally requesting tool calls)
//! and tool results, in the order they are sent back to the provider.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution results
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Results answering the previous assistant message's tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Provider-specific data an adapter needs to echo the message back
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut message = Self::assistant(content);
        message.tool_calls = calls;
        message
    }

    /// Create a tool message carrying one batch of results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let mut message = Self::with_role(Role::Tool, String::new());
        message.tool_results = results;
        message
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A transcript that breaks the tool-call/tool-result pairing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptViolation {
    #[error("message {index} requests tool calls but is not followed by their results")]
    MissingResults { index: usize },

    #[error("message {index} carries tool results without a preceding tool call request")]
    OrphanResults { index: usize },

    #[error("message {index} answers calls {found:?}, expected {expected:?}")]
    MismatchedResults {
        index: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// A conversation is an ordered sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.updated_at = Utc::now();
        self.messages.extend(messages);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Check that every tool-call request is immediately followed by one
    /// tool message answering each call id exactly once.
    pub fn validate(&self) -> Result<(), TranscriptViolation> {
        validate_messages(&self.messages)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// See [`Conversation::validate`].
pub fn validate_messages(messages: &[Message]) -> Result<(), TranscriptViolation> {
    let mut index = 0;
    while index < messages.len() {
        let message = &messages[index];
        if message.role == Role::Tool || !message.tool_results.is_empty() {
            return Err(TranscriptViolation::OrphanResults { index });
        }
        if !message.has_tool_calls() {
            index += 1;
            continue;
        }

        let answer = index + 1;
        let Some(results) = messages.get(answer).filter(|m| m.role == Role::Tool) else {
            return Err(TranscriptViolation::MissingResults { index });
        };

        let mut expected: Vec<String> = message.tool_calls.iter().map(|c| c.id.clone()).collect();
        let mut found: Vec<String> = results
            .tool_results
            .iter()
            .map(|r| r.call_id.clone())
            .collect();
        expected.sort();
        found.sort();
        // Sorted equality also rejects duplicates on either side.
        if expected != found {
            return Err(TranscriptViolation::MismatchedResults {
                index: answer,
                expected,
                found,
            });
        }
        index += 2;
    }
    Ok(())
}

/// A conversation shared between the caller and the turn loop.
///
/// The turn loop is the only writer; callers read snapshots. Writes happen
/// in whole batches so a snapshot never observes half of a round.
#[derive(Debug, Clone, Default)]
pub struct SharedConversation {
    inner: Arc<RwLock<Conversation>>,
}

impl SharedConversation {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            inner: Arc::new(RwLock::new(conversation)),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.read(|c| c.id.clone())
    }

    /// Copy of the current messages.
    pub fn snapshot(&self) -> Vec<Message> {
        self.read(|c| c.messages.clone())
    }

    /// Copy of the whole conversation.
    pub fn conversation(&self) -> Conversation {
        self.read(Conversation::clone)
    }

    pub fn len(&self) -> usize {
        self.read(Conversation::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(Conversation::is_empty)
    }

    /// Append a batch of messages atomically.
    pub fn append(&self, messages: impl IntoIterator<Item = Message>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(messages);
    }

    /// Drop all messages, keeping the conversation id.
    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.messages.clear();
        guard.updated_at = Utc::now();
    }

    fn read<T>(&self, f: impl FnOnce(&Conversation) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

impl From<Conversation> for SharedConversation {
    fn from(conversation: Conversation) -> Self {
        Self::new(conversation)
    }
}
