//! External tool invocation
//!
//! Runs a conversion tool as a child process and turns its exit into a
//! [`CapabilityError`]. No timeout: a conversion runs until the tool exits.
//! The child is killed if the awaiting task is dropped.

use super::CapabilityError;
use crate::config::{Tool, ToolPaths};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried into an error message
const MAX_ERROR_DETAIL: usize = 400;

#[derive(Debug, Clone)]
pub struct ToolRunner {
    paths: ToolPaths,
}

impl ToolRunner {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    /// Run `tool` with `args`, requiring a zero exit status
    pub async fn run(&self, tool: Tool, args: Vec<OsString>) -> Result<Output, CapabilityError> {
        let program = self.paths.program(tool);
        debug!("Running {} {:?}", program.display(), args);

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CapabilityError::ToolMissing(tool.default_program()),
                _ => CapabilityError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = error_detail(&stderr)
                .unwrap_or_else(|| format!("exited with {}", output.status));
            return Err(CapabilityError::tool_failed(tool, detail));
        }

        Ok(output)
    }

    /// Run `tool` and check that it left a non-empty file at `expected`
    pub async fn run_producing(
        &self,
        tool: Tool,
        args: Vec<OsString>,
        expected: &Path,
    ) -> Result<(), CapabilityError> {
        self.run(tool, args).await?;
        ensure_output(tool, expected).await
    }

    /// Is the tool installed? Only spawn failures count as missing.
    pub async fn is_available(&self, tool: Tool) -> bool {
        Command::new(self.paths.program(tool))
            .arg(tool.version_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok()
    }
}

/// A tool can exit cleanly and still write nothing
pub async fn ensure_output(tool: Tool, path: &Path) -> Result<(), CapabilityError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(CapabilityError::NoOutput(tool.default_program())),
    }
}

/// Last meaningful lines of stderr, bounded in length
fn error_detail(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }
    let char_count = trimmed.chars().count();
    if char_count <= MAX_ERROR_DETAIL {
        return Some(trimmed.to_string());
    }
    let tail: String = trimmed.chars().skip(char_count - MAX_ERROR_DETAIL).collect();
    Some(format!("...{}", tail))
}
