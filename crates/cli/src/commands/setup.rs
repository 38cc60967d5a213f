//! Build the agent from configuration.

use std::sync::Arc;

use bareagent_agent::{AgentLoop, SubagentBackend, SubtaskTool};
use bareagent_config::AppConfig;
use bareagent_core::context::ToolContext;
use bareagent_core::event::{AgentEvent, EventBus};
use bareagent_core::tool::{Tool, ToolSet};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::console::{Console, ConsoleApproval};

pub struct Setup {
    pub config: AppConfig,
    pub agent: AgentLoop,
    pub ctx: ToolContext,
    pub events: EventBus,
}

pub fn build(console: &Console) -> Result<Setup, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let (adapter, options) = bareagent_providers::from_config(&config).map_err(|e| {
        format!(
            "{e}\n  Config file: {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;
    let worker_tools = bareagent_tools::default_toolset()?;
    let subtask: Arc<dyn Tool> = Arc::new(SubtaskTool::new(worker_tools.clone()));
    let tools = ToolSet::new(
        worker_tools
            .descriptors()
            .iter()
            .map(|d| Arc::clone(&d.tool))
            .chain([subtask]),
    )?;
    let events = EventBus::default();
    let backend = SubagentBackend {
        adapter: Arc::clone(&adapter),
        options: options.clone(),
    };

    let mut agent = AgentLoop::new(adapter, tools, options).with_events(events.clone());
    if let Some(limit) = config.agent.max_round_trips {
        agent = agent.with_max_round_trips(limit);
    }

    let mut ctx = ToolContext::new(config.working_dir())
        .with_sandbox(config.tools.sandbox)
        .with(backend);
    if config.tools.edit_approval {
        ctx = ctx.with_approval(Arc::new(ConsoleApproval::new(console.clone())));
    }
    debug!(?ctx, "Tool context ready");

    Ok(Setup {
        config,
        agent,
        ctx,
        events,
    })
}

/// Print tool activity to stderr while turns run.
pub fn show_progress(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event.as_ref() {
                AgentEvent::ToolStarted { tool_name, .. } => {
                    eprintln!("  [tool] {tool_name}");
                }
                AgentEvent::ToolFinished {
                    tool_name,
                    status,
                    duration_ms,
                    ..
                } => {
                    eprintln!("  [tool] {tool_name} {status:?} ({duration_ms}ms)");
                }
                _ => {}
            }
        }
    });
}
