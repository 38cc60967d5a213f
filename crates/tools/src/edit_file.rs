//! File edit tool: create a file, or replace text in an existing one.

use async_trait::async_trait;
use bareagent_core::error::ToolError;
use bareagent_core::schema::Signature;
use bareagent_core::tool::{Tool, ToolContent, ToolInput};
use tracing::{info, warn};

use crate::{context_of, resolve_path};

pub struct EditFileTool;

impl EditFileTool {
    /// Apply one edit to `content`. `None` content means the file does not
    /// exist yet. Errors are the messages handed back to the model.
    fn apply(
        path: &str,
        content: Option<&str>,
        old_str: &str,
        new_str: &str,
        count: i64,
    ) -> Result<String, String> {
        match content {
            Some(content) => {
                if !old_str.is_empty() && !content.contains(old_str) {
                    return Err("Error: old_str not found in file content".into());
                }
                Ok(match usize::try_from(count) {
                    Ok(n) => content.replacen(old_str, new_str, n),
                    Err(_) => content.replace(old_str, new_str),
                })
            }
            None if old_str.is_empty() => Ok(new_str.to_string()),
            None => Err(format!("Error: File '{path}' not found")),
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Create or edit a file. For creation, give the new path and set old_str to \"\". \
         For editing, replaces occurrences of old_str with new_str; only the first by default, \
         set count=-1 to replace all. Prefer several small edits over one large one."
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .arg::<String>("path")
            .arg::<String>("old_str")
            .arg::<String>("new_str")
            .arg_with_default("count", 1i64)
            .context()
    }

    async fn execute(&self, input: ToolInput) -> Result<ToolContent, ToolError> {
        let path: String = input.get("path")?;
        let old_str: String = input.get("old_str")?;
        let new_str: String = input.get("new_str")?;
        let count: i64 = input.get_or("count", 1)?;
        let ctx = context_of(&input);

        if old_str == new_str {
            return Ok("Error: old_str and new_str must be different".into());
        }
        let resolved = match resolve_path(&ctx, &path) {
            Ok(resolved) => resolved,
            Err(message) => return Ok(message.into()),
        };

        let existing = match tokio::fs::try_exists(&resolved).await {
            Ok(true) => match tokio::fs::read_to_string(&resolved).await {
                Ok(content) => Some(content),
                Err(e) => return Ok(edit_error(&path, &e)),
            },
            Ok(false) => None,
            Err(e) => return Ok(edit_error(&path, &e)),
        };
        let edited = match Self::apply(&path, existing.as_deref(), &old_str, &new_str, count) {
            Ok(edited) => edited,
            Err(message) => return Ok(message.into()),
        };

        let summary = format!(
            "{} ({} -> {} bytes)",
            resolved.display(),
            existing.as_deref().map_or(0, str::len),
            edited.len()
        );
        if !ctx.approve(self.name(), &summary).await {
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: format!("edit to '{path}' was rejected"),
            });
        }

        if let Some(parent) = resolved.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(edit_error(&path, &e));
        }
        if let Err(e) = tokio::fs::write(&resolved, edited).await {
            return Ok(edit_error(&path, &e));
        }

        info!(path = %resolved.display(), "File updated");
        Ok(format!("Success: Updated {}", resolved.display()).into())
    }
}

fn edit_error(path: &str, e: &std::io::Error) -> ToolContent {
    warn!(path = %path, error = %e, "Error editing file");
    format!("Error editing file '{path}': {e}").into()
}
