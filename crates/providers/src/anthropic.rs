//! Anthropic native adapter.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks; one
//!   batch of results travels as a single user message
//! - Assistant content echoed back verbatim, thinking blocks included
//! - Ephemeral prompt caching on the last content block when tools are set
//! - Structured output through the `output_format` beta

use async_trait::async_trait;
use bareagent_core::error::ProviderError;
use bareagent_core::message::{Message, Role};
use bareagent_core::provider::{InvokeOptions, ProviderAdapter, RawResponse, Usage, WireSchema};
use bareagent_core::tool::{ToolCall, ToolContent, ToolDescriptor, ToolResult, ToolStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::fallback;
use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Metadata key holding the raw assistant content blocks.
const CONTENT_KEY: &str = "anthropic_content";

/// Anthropic Messages API adapter.
pub struct AnthropicAdapter {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    prompt_caching: bool,
}

impl AnthropicAdapter {
    /// Create a new Anthropic adapter.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            prompt_caching: true,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.prompt_caching = enabled;
        self
    }

    /// Convert transcript messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                Role::User => json!({
                    "role": "user",
                    "content": [{ "type": "text", "text": msg.content }],
                }),
                Role::Assistant => json!({
                    "role": "assistant",
                    "content": Self::assistant_blocks(msg),
                }),
                Role::Tool => json!({
                    "role": "user",
                    "content": msg
                        .tool_results
                        .iter()
                        .map(Self::tool_result_block)
                        .collect::<Vec<_>>(),
                }),
            })
            .collect()
    }

    fn assistant_blocks(msg: &Message) -> Value {
        if let Some(raw @ Value::Array(_)) = msg.metadata.get(CONTENT_KEY) {
            return raw.clone();
        }

        let mut blocks = Vec::new();
        if !msg.content.is_empty() || msg.tool_calls.is_empty() {
            blocks.push(json!({ "type": "text", "text": msg.content }));
        }
        for call in &msg.tool_calls {
            blocks.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.arguments,
            }));
        }
        Value::Array(blocks)
    }

    /// A result that is already an array of content blocks (images,
    /// documents) is sent as is; anything else becomes one text block.
    fn tool_result_block(result: &ToolResult) -> Value {
        let content = match &result.content {
            ToolContent::Json(blocks @ Value::Array(_)) => blocks.clone(),
            other => json!([{ "type": "text", "text": other.to_text() }]),
        };
        let mut block = json!({
            "type": "tool_result",
            "tool_use_id": result.call_id,
            "content": content,
        });
        if result.status == ToolStatus::Error {
            block["is_error"] = json!(true);
        }
        block
    }

    fn build_body(
        &self,
        model: &str,
        conversation: &[Message],
        schemas: &[WireSchema],
        options: &InvokeOptions,
    ) -> Value {
        let mut messages = Self::to_api_messages(conversation);
        if self.prompt_caching && !schemas.is_empty() {
            mark_cache_breakpoint(&mut messages);
        }

        let mut body = json!({
            "model": model,
            "max_tokens": options.max_tokens,
            "messages": messages,
        });
        if let Some(system) = &options.system_prompt {
            body["system"] = json!(system);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !schemas.is_empty() {
            body["tools"] = json!(schemas);
        }
        if let Some(format) = &options.output_schema {
            body["output_format"] = json!({
                "type": "json_schema",
                "schema": format.schema,
            });
        }
        body
    }

    async fn send(&self, body: Value) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json");
        if body.get("output_format").is_some() {
            request = request.header("anthropic-beta", STRUCTURED_OUTPUTS_BETA);
        }
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(http::network_error)?;

        let body = http::read_json(&self.name, response).await?;
        let meta: AnthropicResponse = serde_json::from_value(body.clone()).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;
        info!(
            model = %meta.model,
            stop_reason = meta.stop_reason.as_deref().unwrap_or("none"),
            input_tokens = meta.usage.input_tokens,
            output_tokens = meta.usage.output_tokens,
            "Anthropic response"
        );

        Ok(RawResponse {
            model: meta.model,
            usage: Some(Usage {
                prompt_tokens: meta.usage.input_tokens,
                completion_tokens: meta.usage.output_tokens,
                total_tokens: meta.usage.input_tokens + meta.usage.output_tokens,
            }),
            body,
        })
    }

    /// Concatenated text plus tool calls; thinking is logged, never returned.
    fn parse_content(response: &RawResponse) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let blocks: Vec<ResponseContentBlock> =
            serde_json::from_value(response.body["content"].clone()).map_err(|e| {
                ProviderError::InvalidResponse(format!("Bad Anthropic content blocks: {e}"))
            })?;

        let mut text = String::new();
        let mut calls = Vec::new();
        for block in blocks {
            match block {
                ResponseContentBlock::Thinking { thinking } => {
                    debug!(model = %response.model, %thinking, "Thinking");
                }
                ResponseContentBlock::Text { text: part } => text.push_str(&part),
                ResponseContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ResponseContentBlock::Other => {}
            }
        }
        Ok((text, calls))
    }
}

/// Put an ephemeral cache breakpoint on the last content block.
fn mark_cache_breakpoint(messages: &mut [Value]) {
    let last_block = messages
        .last_mut()
        .and_then(|m| m.get_mut("content"))
        .and_then(Value::as_array_mut)
        .and_then(|blocks| blocks.last_mut())
        .and_then(Value::as_object_mut);
    if let Some(block) = last_block {
        block.insert("cache_control".into(), json!({ "type": "ephemeral" }));
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
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
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.schema.to_json_schema(),
            "strict": true,
        })
    }

    fn split_response(
        &self,
        response: &RawResponse,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        Self::parse_content(response)
    }

    fn append_assistant(&self, response: RawResponse) -> Vec<Message> {
        let (text, calls) = Self::parse_content(&response).unwrap_or_default();
        let content = response.body.get("content").cloned().unwrap_or(json!([]));
        vec![
            Message::assistant_with_calls(text, calls)
                .with_metadata(CONTENT_KEY, content)
                .with_metadata("model", json!(response.model)),
        ]
    }

    fn append_tool_results(&self, results: Vec<ToolResult>) -> Vec<Message> {
        vec![Message::tool_results(results)]
    }
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bareagent_core::schema::Signature;
    use bareagent_core::tool::{FnTool, Tool};
    use std::sync::Arc;

    fn raw(body: Value) -> RawResponse {
        RawResponse {
            model: "claude-haiku-4-5".into(),
            body,
            usage: None,
        }
    }

    fn weather_tool() -> ToolDescriptor {
        let tool: Arc<dyn Tool> = Arc::new(FnTool::new(
            "get_weather",
            "Get the current weather for a city.",
            Signature::new().arg::<String>("city"),
            |_input| async { Ok(ToolContent::Text("Sunny".into())) },
        ));
        ToolDescriptor::new(tool).unwrap()
    }

    #[test]
    fn constructor_with_base_url() {
        let adapter = AnthropicAdapter::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(adapter.name(), "anthropic");
        assert_eq!(adapter.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn split_text_thinking_and_tool_use() {
        let adapter = AnthropicAdapter::new("k");
        let response = raw(json!({
            "content": [
                {"type": "thinking", "thinking": "The user wants weather.", "signature": "sig"},
                {"type": "text", "text": "Let me check. "},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}},
                {"type": "server_tool_use", "id": "srv_1"}
            ]
        }));

        let (text, calls) = adapter.split_response(&response).unwrap();
        assert_eq!(text, "Let me check. ");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].arguments, json!({"city": "Paris"}));
    }

    #[test]
    fn missing_content_is_invalid_response() {
        let adapter = AnthropicAdapter::new("k");
        assert!(matches!(
            adapter.split_response(&raw(json!({"error": "x"}))),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn assistant_content_echoed_verbatim() {
        let adapter = AnthropicAdapter::new("k");
        let content = json!([
            {"type": "thinking", "thinking": "hmm", "signature": "sig"},
            {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
        ]);
        let messages = adapter.append_assistant(raw(json!({ "content": content })));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tool_calls.len(), 1);

        let api = AnthropicAdapter::to_api_messages(&messages);
        assert_eq!(api[0]["role"], "assistant");
        assert_eq!(api[0]["content"], content);
    }

    #[test]
    fn tool_results_become_one_user_message() {
        let adapter = AnthropicAdapter::new("k");
        let messages = adapter.append_tool_results(vec![
            ToolResult::ok("toolu_1", "Sunny"),
            ToolResult::error("toolu_2", "Error calling tool x: boom"),
        ]);
        assert_eq!(messages.len(), 1);

        let api = AnthropicAdapter::to_api_messages(&messages);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0]["role"], "user");
        let blocks = api[0]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "tool_result");
        assert_eq!(blocks[0]["tool_use_id"], "toolu_1");
        assert_eq!(blocks[0]["content"][0]["text"], "Sunny");
        assert!(blocks[0].get("is_error").is_none());
        assert_eq!(blocks[1]["is_error"], true);
    }

    #[test]
    fn content_block_results_pass_through() {
        let image = json!([{
            "type": "image",
            "source": {"type": "base64", "media_type": "image/png", "data": "iVBORw0KGgo="}
        }]);
        let messages = vec![Message::tool_results(vec![
            ToolResult::ok("toolu_1", image.clone()),
            ToolResult::ok("toolu_2", json!({"temp": 21})),
        ])];

        let api = AnthropicAdapter::to_api_messages(&messages);
        let blocks = api[0]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["content"], image);
        // A non-array value is still rendered as text.
        assert_eq!(blocks[1]["content"][0]["type"], "text");
        assert_eq!(blocks[1]["content"][0]["text"], "{\"temp\":21}");
    }

    #[test]
    fn schema_encoding_is_strict() {
        let adapter = AnthropicAdapter::new("k");
        let schema = adapter.encode_schema(&weather_tool());
        assert_eq!(schema["name"], "get_weather");
        assert_eq!(schema["strict"], true);
        assert_eq!(schema["input_schema"]["required"], json!(["city"]));
        assert_eq!(schema["input_schema"]["additionalProperties"], false);
    }

    #[test]
    fn body_carries_system_tools_and_cache_breakpoint() {
        let adapter = AnthropicAdapter::new("k");
        let schemas = vec![adapter.encode_schema(&weather_tool())];
        let options = InvokeOptions::new("claude-haiku-4-5").with_system_prompt("Be brief.");
        let conversation = vec![Message::user("What's the weather in Paris?")];

        let body = adapter.build_body("claude-haiku-4-5", &conversation, &schemas, &options);
        assert_eq!(body["model"], "claude-haiku-4-5");
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["tools"][0]["name"], "get_weather");
        assert!(body.get("temperature").is_none());
        assert_eq!(
            body["messages"][0]["content"][0]["cache_control"],
            json!({"type": "ephemeral"})
        );

        let bare = adapter.build_body("claude-haiku-4-5", &conversation, &[], &options);
        assert!(bare.get("tools").is_none());
        assert!(bare["messages"][0]["content"][0].get("cache_control").is_none());
        assert!(bare.get("output_format").is_none());
    }

    #[test]
    fn body_carries_output_format() {
        let adapter = AnthropicAdapter::new("k");
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"],
            "additionalProperties": false
        });
        let options = InvokeOptions::new("claude-sonnet-4-5").with_output_schema("place", schema.clone());
        let conversation = vec![Message::user("Where is the Louvre?")];

        for schemas in [vec![], vec![adapter.encode_schema(&weather_tool())]] {
            let body = adapter.build_body("claude-sonnet-4-5", &conversation, &schemas, &options);
            assert_eq!(body["output_format"]["type"], "json_schema");
            assert_eq!(body["output_format"]["schema"], schema);
        }
    }
}
