//! `subtask` tool: hand a self-contained job to a fresh agent loop.
//!
//! The sub-agent starts from an empty transcript with its own tool set and
//! runs one turn. Its backend comes from the [`SubagentBackend`] bound in
//! the caller's context, and its cancellation is a child of the caller's
//! turn.

use std::sync::Arc;

use async_trait::async_trait;
use bareagent_core::context::ToolContext;
use bareagent_core::error::ToolError;
use bareagent_core::message::SharedConversation;
use bareagent_core::provider::{InvokeOptions, ProviderAdapter};
use bareagent_core::schema::Signature;
use bareagent_core::tool::{Tool, ToolContent, ToolInput, ToolSet};
use tracing::{Instrument, info, info_span, warn};

use crate::loop_runner::AgentLoop;

/// Context binding naming the backend sub-agents run against.
pub struct SubagentBackend {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub options: InvokeOptions,
}

pub struct SubtaskTool {
    tools: ToolSet,
}

impl SubtaskTool {
    /// Sub-agents get `tools`; leave `subtask` out to stop recursion.
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Tool for SubtaskTool {
    fn name(&self) -> &str {
        "subtask"
    }

    fn description(&self) -> &str {
        "Spawn a sub-agent to work on a specific task autonomously. The sub-agent has the \
         file and shell tools and starts with no conversation history, so the prompt must \
         say what the task is, which files matter and what outcome is expected. \
         task_label is a 3-5 word summary for progress tracking; model optionally overrides \
         the model used."
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .arg::<String>("prompt")
            .arg::<String>("task_label")
            .arg::<Option<String>>("model")
            .context()
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolContent, ToolError> {
        let prompt: String = input.get("prompt")?;
        let label: String = input.get("task_label")?;
        let model: Option<String> = input.get_or("model", None)?;
        let ctx = input
            .context()
            .cloned()
            .or_else(ToolContext::current)
            .unwrap_or_default();

        let backend = ctx
            .get::<SubagentBackend>()
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: "no sub-agent backend configured".into(),
            })?;
        let mut options = backend.options.clone();
        if let Some(model) = model {
            options.set_primary(model);
        }

        let agent = AgentLoop::new(Arc::clone(&backend.adapter), self.tools.clone(), options);
        let conversation = SharedConversation::default();
        let span = info_span!("subtask", task = %label);
        let outcome = agent
            .run_turn(&conversation, &prompt, ctx.child())
            .instrument(span)
            .await;

        match outcome {
            Ok(reply) => {
                info!(task = %label, rounds = conversation.len(), "Subtask complete");
                Ok(format!("subtask '{label}' complete: {reply}").into())
            }
            Err(e) if e.is_cancelled() => Err(ToolError::Cancelled),
            Err(e) => {
                warn!(task = %label, error = %e, "Subtask failed");
                Ok(format!("Error executing subtask '{label}': {e}").into())
            }
        }
    }
}
