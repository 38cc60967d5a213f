//! File read tool: read a text file relative to the working directory.

use async_trait::async_trait;
use bareagent_core::error::ToolError;
use bareagent_core::schema::Signature;
use bareagent_core::tool::{Tool, ToolContent, ToolInput};
use tracing::{info, warn};

use crate::{context_of, resolve_path};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read and return the contents of a file at the given path. Only works with files, not directories."
    }

    fn signature(&self) -> Signature {
        Signature::new().arg::<String>("path").context()
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolContent, ToolError> {
        let path: String = input.get("path")?;
        let ctx = context_of(&input);

        let resolved = match resolve_path(&ctx, &path) {
            Ok(resolved) => resolved,
            Err(message) => return Ok(ToolContent::Text(message)),
        };

        info!(path = %resolved.display(), "Reading file");
        match tokio::fs::read(&resolved).await {
            Ok(bytes) => Ok(ToolContent::Text(
                String::from_utf8_lossy(&bytes).trim().to_string(),
            )),
            Err(e) => {
                warn!(path = %path, error = %e, "Error reading file");
                Ok(ToolContent::Text(format!("Error reading file '{path}': {e}")))
            }
        }
    }
}
