//! OpenAI-compatible adapter.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions` with function tools.
//!
//! Tool arguments arrive as a JSON-encoded string. They are kept that way
//! in the transcript (so they echo back byte-for-byte) and decoded only
//! when the call is dispatched.

use async_trait::async_trait;
use bareagent_core::context::ToolContext;
use bareagent_core::error::ProviderError;
use bareagent_core::message::{Message, Role};
use bareagent_core::provider::{InvokeOptions, ProviderAdapter, RawResponse, Usage, WireSchema};
use bareagent_core::tool::{ToolCall, ToolDescriptor, ToolResult, ToolSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::fallback;
use crate::http;

/// An OpenAI-compatible chat completions adapter.
pub struct OpenAiAdapter {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create an OpenAI adapter (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter adapter (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama adapter (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert transcript messages to OpenAI API format. A tool-result
    /// message expands to one `tool` message per result.
    fn to_api_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            out.push(ApiMessage::text("system", system));
        }

        for m in messages {
            match m.role {
                Role::User => out.push(ApiMessage::text("user", &m.content)),
                Role::Assistant => out.push(ApiMessage {
                    role: "assistant".into(),
                    content: if m.content.is_empty() && !m.tool_calls.is_empty() {
                        None
                    } else {
                        Some(m.content.clone())
                    },
                    tool_calls: (!m.tool_calls.is_empty()).then(|| {
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: encoded_arguments(&tc.arguments),
                                },
                            })
                            .collect()
                    }),
                    tool_call_id: None,
                }),
                Role::Tool => out.extend(m.tool_results.iter().map(|r| ApiMessage {
                    role: "tool".into(),
                    content: Some(r.content.to_text()),
                    tool_calls: None,
                    tool_call_id: Some(r.call_id.clone()),
                })),
            }
        }
        out
    }

    fn build_body(
        &self,
        model: &str,
        conversation: &[Message],
        schemas: &[WireSchema],
        options: &InvokeOptions,
    ) -> Value {
        let mut body = json!({
            "model": model,
            "messages": Self::to_api_messages(conversation, options.system_prompt.as_deref()),
            "max_tokens": options.max_tokens,
            "stream": false,
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !schemas.is_empty() {
            body["tools"] = json!(schemas);
        }
        if let Some(format) = &options.output_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "schema": format.schema,
                    "strict": true,
                },
            });
        }
        body
    }

    async fn send(&self, body: Value) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;

        let body = http::read_json(&self.name, response).await?;
        let meta: ApiResponseMeta = serde_json::from_value(body.clone()).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse {} response: {e}", self.name))
        })?;
        debug!(provider = %self.name, model = %meta.model, "Completion received");

        Ok(RawResponse {
            model: meta.model,
            usage: meta.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            body,
        })
    }

    fn first_message(response: &RawResponse) -> Result<ApiResponseMessage, ProviderError> {
        let choice = response.body["choices"]
            .get(0)
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;
        serde_json::from_value(choice["message"].clone())
            .map_err(|e| ProviderError::InvalidResponse(format!("Bad choice message: {e}")))
    }
}

/// The wire form of arguments: the model's raw string, or JSON text.
fn encoded_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        conversation: &[Message],
        schemas: &[WireSchema],
        options: &InvokeOptions,
    ) -> Result<RawResponse, ProviderError> {
        fallback::try_models(&self.name, options, |model| {
            let body = self.build_body(model, conversation, schemas, options);
            self.send(body)
        })
        .await
    }

    fn encode_schema(&self, tool: &ToolDescriptor) -> WireSchema {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.schema.to_json_schema(),
            }
        })
    }

    async fn dispatch_tool(&self, call: &ToolCall, tools: &ToolSet, ctx: ToolContext) -> ToolResult {
        let arguments = match &call.arguments {
            Value::String(raw) if raw.trim().is_empty() => Value::Null,
            Value::String(raw) => match serde_json::from_str(raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
                    return ToolResult::error(
                        &call.id,
                        format!("Error calling tool {}: invalid arguments: {e}", call.name),
                    );
                }
            },
            other => other.clone(),
        };
        tools.execute(&call.id, &call.name, arguments, ctx).await
    }

    fn split_response(
        &self,
        response: &RawResponse,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let message = Self::first_message(response)?;
        let calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: Value::String(tc.function.arguments),
            })
            .collect();
        Ok((message.content.unwrap_or_default(), calls))
    }

    fn append_assistant(&self, response: RawResponse) -> Vec<Message> {
        let (text, calls) = self.split_response(&response).unwrap_or_default();
        vec![Message::assistant_with_calls(text, calls).with_metadata("model", json!(response.model))]
    }

    fn append_tool_results(&self, results: Vec<ToolResult>) -> Vec<Message> {
        vec![Message::tool_results(results)]
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMeta {
    #[serde(default)]
    model: String,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
