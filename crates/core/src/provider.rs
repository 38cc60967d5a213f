//! Provider adapter trait: the boundary between the turn loop and an LLM
//! backend.
//!
//! The turn loop knows nothing about wire formats. An adapter invokes the
//! model, encodes tool schemas, formats tool arguments, splits responses
//! into text and tool calls, and builds the transcript messages for
//! assistant replies and tool results.
//!
//! Implementations: Anthropic Messages API, OpenAI-compatible chat
//! completions (see `bareagent-providers`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ToolContext;
use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolDescriptor, ToolResult, ToolSet};

/// A tool schema in a provider's wire format.
pub type WireSchema = serde_json::Value;

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An undecoded model response, as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Which model actually responded
    pub model: String,

    /// The response body
    pub body: serde_json::Value,

    pub usage: Option<Usage>,
}

/// A JSON schema the final reply must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Schema name, required by some backends
    pub name: String,
    pub schema: serde_json::Value,
}

/// Per-invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    /// Models to try in order: the primary first, then fallbacks.
    pub models: Vec<String>,

    pub system_prompt: Option<String>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Timeout for each attempt against one model
    pub timeout: Duration,

    /// Structured output format, when the reply must be JSON
    pub output_schema: Option<OutputSchema>,
}

impl InvokeOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            models: vec![model.into()],
            ..Self::default()
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = String>) -> Self {
        self.models.extend(fallbacks);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Constrain the reply text to JSON matching `schema`.
    pub fn with_output_schema(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.output_schema = Some(OutputSchema {
            name: name.into(),
            schema,
        });
        self
    }

    /// Replace the primary model, keeping the fallbacks.
    pub fn set_primary(&mut self, model: impl Into<String>) {
        match self.models.first_mut() {
            Some(primary) => *primary = model.into(),
            None => self.models.push(model.into()),
        }
    }

    pub fn primary_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            system_prompt: None,
            max_tokens: 4096,
            temperature: None,
            timeout: Duration::from_secs(120),
            output_schema: None,
        }
    }
}

/// The capability set the turn loop needs from a backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Send the conversation and tool schemas, returning the raw response.
    async fn invoke(
        &self,
        conversation: &[Message],
        schemas: &[WireSchema],
        options: &InvokeOptions,
    ) -> Result<RawResponse, ProviderError>;

    /// Encode one tool's invocation schema in this provider's format.
    fn encode_schema(&self, tool: &ToolDescriptor) -> WireSchema;

    /// Format the call's arguments for the tool and run it.
    async fn dispatch_tool(&self, call: &ToolCall, tools: &ToolSet, ctx: ToolContext) -> ToolResult {
        tools
            .execute(&call.id, &call.name, call.arguments.clone(), ctx)
            .await
    }

    /// Split a response into its concatenated text and requested tool calls.
    fn split_response(
        &self,
        response: &RawResponse,
    ) -> Result<(String, Vec<ToolCall>), ProviderError>;

    /// Transcript messages recording the assistant reply.
    fn append_assistant(&self, response: RawResponse) -> Vec<Message>;

    /// Transcript messages recording one batch of tool results.
    fn append_tool_results(&self, results: Vec<ToolResult>) -> Vec<Message>;

    /// Encode a whole tool set, in order.
    fn encode_schemas(&self, tools: &ToolSet) -> Vec<WireSchema> {
        tools
            .descriptors()
            .iter()
            .map(|d| self.encode_schema(d))
            .collect()
    }
}
