//! Shared test helpers for the agent crate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bareagent_core::error::{ProviderError, ToolError};
use bareagent_core::message::Message;
use bareagent_core::provider::{InvokeOptions, ProviderAdapter, RawResponse, Usage, WireSchema};
use bareagent_core::schema::Signature;
use bareagent_core::tool::{
    FnTool, Tool, ToolCall, ToolContent, ToolDescriptor, ToolInput, ToolResult, ToolSet,
};
use serde_json::{Value, json};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Step {
    Reply { text: String, calls: Vec<ToolCall> },
    Fail(ProviderError),
    /// Never answers; only a cancel gets the loop past this.
    Hang,
}

pub fn text(text: &str) -> Step {
    Step::Reply {
        text: text.into(),
        calls: vec![],
    }
}

pub fn calls(text: &str, calls: Vec<ToolCall>) -> Step {
    Step::Reply {
        text: text.into(),
        calls,
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

/// A mock adapter that returns a sequence of scripted replies and records
/// the transcript it was shown on every invocation.
pub struct ScriptedAdapter {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<Vec<Message>>>,
    models: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Transcripts passed to each invocation, in order.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    /// Primary model requested on each invocation.
    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        conversation: &[Message],
        _schemas: &[WireSchema],
        options: &InvokeOptions,
    ) -> Result<RawResponse, ProviderError> {
        self.seen.lock().unwrap().push(conversation.to_vec());
        self.models
            .lock()
            .unwrap()
            .push(options.primary_model().unwrap_or_default().to_string());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply { text, calls }) => Ok(RawResponse {
                model: "mock-model".into(),
                body: json!({ "text": text, "calls": calls }),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
            }),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => panic!("ScriptedAdapter: no more steps"),
        }
    }

    fn encode_schema(&self, tool: &ToolDescriptor) -> WireSchema {
        json!({ "name": tool.name, "parameters": tool.schema.to_json_schema() })
    }

    fn split_response(
        &self,
        response: &RawResponse,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let text = response.body["text"].as_str().unwrap_or_default().to_string();
        let calls = serde_json::from_value(response.body["calls"].clone())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok((text, calls))
    }

    fn append_assistant(&self, response: RawResponse) -> Vec<Message> {
        let (text, calls) = self.split_response(&response).unwrap();
        vec![Message::assistant_with_calls(text, calls)]
    }

    fn append_tool_results(&self, results: Vec<ToolResult>) -> Vec<Message> {
        vec![Message::tool_results(results)]
    }
}

async fn always_fail(_input: ToolInput) -> Result<ToolContent, ToolError> {
    Err(ToolError::ExecutionFailed {
        tool_name: "fail".into(),
        reason: "boom".into(),
    })
}

async fn explode(_input: ToolInput) -> Result<ToolContent, ToolError> {
    panic!("tool exploded")
}

/// Tools exercising the dispatch paths:
/// - `sleep(ms, label)` waits then returns `label`
/// - `fail()` always errors
/// - `panic()` panics
/// - `whoami(ctx)` returns the `String` bound in its context
pub fn test_tools() -> ToolSet {
    let sleep: Arc<dyn Tool> = Arc::new(FnTool::new(
        "sleep",
        "Sleep, then echo a label.",
        Signature::new().arg::<u64>("ms").arg::<String>("label"),
        |input| async move {
            let ms: u64 = input.get("ms")?;
            let label: String = input.get("label")?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ToolContent::Text(label))
        },
    ));
    let fail: Arc<dyn Tool> = Arc::new(FnTool::new(
        "fail",
        "Always fails.",
        Signature::new(),
        always_fail,
    ));
    let panic: Arc<dyn Tool> = Arc::new(FnTool::new(
        "panic",
        "Panics.",
        Signature::new(),
        explode,
    ));
    let whoami: Arc<dyn Tool> = Arc::new(FnTool::new(
        "whoami",
        "Report the bound tenant.",
        Signature::new().context(),
        |input| async move {
            let tenant = input
                .context()
                .and_then(|ctx| ctx.get::<String>())
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "nobody".into());
            Ok(ToolContent::Text(tenant))
        },
    ));
    ToolSet::new([sleep, fail, panic, whoami]).unwrap()
}
