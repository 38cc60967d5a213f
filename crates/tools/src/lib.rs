//! Built-in tools for bareagent.
//!
//! - `read_file` reads a text file
//! - `edit_file` creates a file or replaces text in one
//! - `bash` runs a shell command
//!
//! All three take their working directory, sandbox flag, approval handler
//! and cancellation from the injected [`ToolContext`]. With sandboxing on,
//! only relative paths that stay inside the working directory are accepted.

pub mod bash;
pub mod edit_file;
pub mod read_file;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bareagent_core::context::ToolContext;
use bareagent_core::error::SchemaError;
use bareagent_core::tool::{Tool, ToolInput, ToolSet};

pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use read_file::ReadFileTool;

/// The three built-in tools as a ready-to-use tool set.
pub fn default_toolset() -> Result<ToolSet, SchemaError> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ReadFileTool),
        Arc::new(EditFileTool),
        Arc::new(BashTool),
    ];
    ToolSet::new(tools)
}

/// The context a tool runs under: the injected slot, else the task's.
pub(crate) fn context_of(input: &ToolInput) -> ToolContext {
    input
        .context()
        .cloned()
        .or_else(ToolContext::current)
        .unwrap_or_default()
}

/// Resolve `path` against the context's working directory.
///
/// The error is the message handed back to the model.
pub fn resolve_path(ctx: &ToolContext, path: &str) -> Result<PathBuf, String> {
    let root = normalize(ctx.working_dir());
    let requested = Path::new(path);

    if !ctx.is_sandboxed() {
        return Ok(normalize(&root.join(requested)));
    }

    if requested.is_absolute() {
        return Err(format!(
            "Error: Absolute paths not allowed when sandbox is set. Use relative path: {path}"
        ));
    }
    let resolved = normalize(&root.join(requested));
    if !resolved.starts_with(&root) {
        return Err(format!("Error: Path escapes sandbox: {path}"));
    }

    // Symlinks inside the working directory may still point outside it.
    let real_root = root.canonicalize().unwrap_or_else(|_| root.clone());
    if !canonicalize_existing(&resolved).starts_with(&real_root) {
        return Err(format!("Error: Path escapes sandbox: {path}"));
    }
    Ok(resolved)
}

/// Canonicalize the nearest existing ancestor of `path` and re-attach the
/// components that do not exist yet.
fn canonicalize_existing(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Lexically collapse `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
