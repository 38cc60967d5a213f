//! Error types for the bareagent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all bareagent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Tool registration ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Turn lifecycle ---
    #[error("Turn cancelled")]
    Cancelled,

    #[error("Turn exceeded {limit} model round trips")]
    RoundTripLimit { limit: usize },

    #[error("Session is closed")]
    SessionClosed,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error ended a turn because of a cancel request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A tool signature that cannot be turned into an invocation schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Tool {tool} must have a description")]
    MissingDescription { tool: String },

    #[error("Parameter {tool}.{param} has no type annotation")]
    MissingAnnotation { tool: String, param: String },

    #[error("Unsupported type in {tool}.{param}: {found}")]
    UnsupportedType {
        tool: String,
        param: String,
        found: String,
    },

    #[error("Parameter {tool}.{param}: list must have a type parameter")]
    BareList { tool: String, param: String },

    #[error("Parameter {tool}.{param}: only T | None unions are supported")]
    NonOptionalUnion { tool: String, param: String },

    #[error("Empty Literal in {tool}.{param}")]
    EmptyLiteral { tool: String, param: String },

    #[error("Literal cannot have mixed types: {tool}.{param}")]
    MixedLiteral { tool: String, param: String },

    #[error("Parameter {param} declared twice on tool {tool}")]
    DuplicateParameter { tool: String, param: String },

    #[error("Tool name registered twice: {0}")]
    DuplicateTool(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Failure raised by a tool body. Never escapes the dispatcher: it becomes
/// the content of an error-status tool result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("permission denied for {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("cancelled")]
    Cancelled,
}
