//! Bash tool: run a command with `bash -c` in the working directory.
//!
//! The child is killed when the turn is cancelled.

use std::process::Stdio;

use async_trait::async_trait;
use bareagent_core::error::ToolError;
use bareagent_core::schema::Signature;
use bareagent_core::tool::{Tool, ToolContent, ToolInput};
use tokio::process::Command;
use tracing::{info, warn};

use crate::context_of;

pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return its stdout, stderr and exit code."
    }

    fn signature(&self) -> Signature {
        Signature::new().arg::<String>("command").context()
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolContent, ToolError> {
        let command: String = input.get("command")?;
        let ctx = context_of(&input);

        info!(command = %command, cwd = %ctx.working_dir().display(), "Executing bash");
        let child = Command::new("bash")
            .args(["-c", &command])
            .current_dir(ctx.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return Ok(bash_error(&e)),
        };

        let output = tokio::select! {
            output = child.wait_with_output() => output,
            _ = ctx.cancelled() => {
                // Dropping the wait future drops the child, which kills it.
                warn!(command = %command, "Bash command cancelled");
                return Err(ToolError::Cancelled);
            }
        };

        match output {
            Ok(output) => {
                let code = output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                Ok(format!(
                    "STDOUT:\n{}\nSTDERR:\n{}\nEXIT CODE: {code}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr),
                )
                .into())
            }
            Err(e) => Ok(bash_error(&e)),
        }
    }
}

fn bash_error(e: &std::io::Error) -> ToolContent {
    warn!(error = %e, "Error executing bash command");
    format!("Error executing bash command: {e}").into()
}
