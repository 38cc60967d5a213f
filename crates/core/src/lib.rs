//! # bareagent core
//!
//! Domain types, traits, and error definitions for the bareagent turn loop.
//! This crate has no HTTP or CLI dependencies; it defines the model that the
//! provider adapters, tools and the agent loop implement against.
//!
//! - [`schema`] derives invocation schemas from declared tool signatures
//! - [`tool`] holds the `Tool` trait and the `ToolSet` executing calls by name
//! - [`context`] carries ambient state and cancellation into tool tasks
//! - [`provider`] is the adapter boundary to LLM backends
//! - [`message`] is the transcript shared with the caller

pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{ApprovalHandler, AutoApprove, ToolContext};
pub use error::{Error, ProviderError, Result, SchemaError, ToolError};
pub use event::{AgentEvent, EventBus, TurnState};
pub use message::{Conversation, ConversationId, Message, Role, SharedConversation};
pub use provider::{InvokeOptions, OutputSchema, ProviderAdapter, RawResponse, Usage, WireSchema};
pub use schema::{Annotated, InvocationSchema, Signature, TypeAnnotation};
pub use tool::{
    FnTool, Tool, ToolCall, ToolContent, ToolDescriptor, ToolInput, ToolResult, ToolSet,
    ToolStatus,
};

/// Re-exported so callers can build cancellation tokens without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
