//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool declares a name, a description and a [`Signature`]. A
//! [`ToolSet`] derives every tool's [`InvocationSchema`] once at
//! construction and executes calls by name, turning every failure into an
//! error-status [`ToolResult`] so that one bad call never takes down its
//! siblings.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::context::ToolContext;
use crate::error::{SchemaError, ToolError};
use crate::schema::{self, InvocationSchema, Signature};

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call ID, echoed back in the result
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as the provider delivered them
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
    Interrupted,
}

/// What a tool returns: plain text or a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolContent {
    Text(String),
    Json(Value),
}

impl ToolContent {
    /// Text rendering sent to providers that only accept strings.
    pub fn to_text(&self) -> String {
        match self {
            ToolContent::Text(text) => text.clone(),
            ToolContent::Json(value) => value.to_string(),
        }
    }
}

impl fmt::Display for ToolContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolContent::Text(text) => f.write_str(text),
            ToolContent::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<String> for ToolContent {
    fn from(text: String) -> Self {
        ToolContent::Text(text)
    }
}

impl From<&str> for ToolContent {
    fn from(text: &str) -> Self {
        ToolContent::Text(text.to_string())
    }
}

impl From<Value> for ToolContent {
    fn from(value: Value) -> Self {
        ToolContent::Json(value)
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    pub content: ToolContent,

    pub status: ToolStatus,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<ToolContent>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            status: ToolStatus::Ok,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: ToolContent::Text(message.into()),
            status: ToolStatus::Error,
        }
    }

    /// Placeholder for a call whose turn was cancelled before it settled.
    pub fn interrupted(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: ToolContent::Text("Interrupted".into()),
            status: ToolStatus::Interrupted,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }
}

/// Arguments handed to [`Tool::execute`].
#[derive(Debug, Clone)]
pub struct ToolInput {
    arguments: serde_json::Map<String, Value>,
    context: Option<ToolContext>,
}

impl ToolInput {
    pub fn new(arguments: serde_json::Map<String, Value>) -> Self {
        Self {
            arguments,
            context: None,
        }
    }

    pub fn with_context(mut self, context: ToolContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn arguments(&self) -> &serde_json::Map<String, Value> {
        &self.arguments
    }

    /// Typed access to an argument. A missing argument deserializes from
    /// `null`, so `Option<T>` yields `None`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolError> {
        match self.arguments.get(name) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ToolError::InvalidArguments(format!("argument '{name}': {e}"))),
            None => serde_json::from_value(Value::Null).map_err(|_| {
                ToolError::InvalidArguments(format!("missing required argument '{name}'"))
            }),
        }
    }

    /// Like [`ToolInput::get`], falling back to `default` when absent or null.
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, ToolError> {
        match self.arguments.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.get(name),
        }
    }

    /// The injected context; only present when the tool declared the slot.
    pub fn context(&self) -> Option<&ToolContext> {
        self.context.as_ref()
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file", "bash").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// The declared parameter list.
    fn signature(&self) -> Signature;

    /// Execute the tool with the given arguments.
    async fn execute(&self, input: ToolInput) -> Result<ToolContent, ToolError>;
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolContent, ToolError>> + Send>>;
type BoxedHandler = Arc<dyn Fn(ToolInput) -> ToolFuture + Send + Sync>;

/// A tool built from an async closure.
pub struct FnTool {
    name: String,
    description: String,
    signature: Signature,
    handler: BoxedHandler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        signature: Signature,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolContent, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            signature,
            handler: Arc::new(move |input| -> ToolFuture { Box::pin(handler(input)) }),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn signature(&self) -> Signature {
        self.signature.clone()
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolContent, ToolError> {
        (self.handler)(input).await
    }
}

/// A registered tool with its derived schema. Immutable once built.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: InvocationSchema,
    pub tool: Arc<dyn Tool>,
}

impl ToolDescriptor {
    pub fn new(tool: Arc<dyn Tool>) -> Result<Self, SchemaError> {
        let schema = schema::derive(tool.name(), &tool.signature(), tool.description())?;
        Ok(Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            schema,
            tool,
        })
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish()
    }
}

/// The ordered, name-unique set of tools available to a turn.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    descriptors: Arc<Vec<ToolDescriptor>>,
    index: Arc<HashMap<String, usize>>,
}

impl ToolSet {
    /// Derive every tool's schema. Fails on the first bad signature or on a
    /// repeated tool name.
    pub fn new(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self, SchemaError> {
        let mut descriptors = Vec::new();
        let mut index = HashMap::new();
        for tool in tools {
            let descriptor = ToolDescriptor::new(tool)?;
            if index
                .insert(descriptor.name.clone(), descriptors.len())
                .is_some()
            {
                return Err(SchemaError::DuplicateTool(descriptor.name));
            }
            descriptors.push(descriptor);
        }
        Ok(Self {
            descriptors: Arc::new(descriptors),
            index: Arc::new(index),
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Execute one call. Never fails: unknown tools, bad arguments and tool
    /// errors all come back as error-status results.
    pub async fn execute(
        &self,
        call_id: &str,
        name: &str,
        arguments: Value,
        ctx: ToolContext,
    ) -> ToolResult {
        let Some(descriptor) = self.get(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            return ToolResult::error(call_id, format!("unknown tool: {name}"));
        };

        let input = match build_input(descriptor, arguments) {
            Ok(input) => input,
            Err(e) => return failed(call_id, name, &e),
        };
        let input = if descriptor.schema.has_context_slot() {
            input.with_context(ctx)
        } else {
            input
        };

        match descriptor.tool.execute(input).await {
            Ok(content) => ToolResult::ok(call_id, content),
            Err(e) => failed(call_id, name, &e),
        }
    }
}

fn failed(call_id: &str, name: &str, error: &ToolError) -> ToolResult {
    warn!(tool = %name, error = %error, "Tool execution failed");
    ToolResult::error(call_id, format!("Error calling tool {name}: {error}"))
}

fn build_input(descriptor: &ToolDescriptor, arguments: Value) -> Result<ToolInput, ToolError> {
    let arguments = match arguments {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected a JSON object, got {other}"
            )));
        }
    };

    let schema = &descriptor.schema;
    if let Some(unexpected) = arguments.keys().find(|k| schema.param(k).is_none()) {
        return Err(ToolError::InvalidArguments(format!(
            "unexpected argument '{unexpected}'"
        )));
    }
    if let Some(missing) = schema
        .required()
        .into_iter()
        .find(|name| !arguments.contains_key(*name))
    {
        return Err(ToolError::InvalidArguments(format!(
            "missing required argument '{missing}'"
        )));
    }

    Ok(ToolInput::new(arguments))
}
