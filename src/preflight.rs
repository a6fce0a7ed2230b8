//! Pre-flight Check System
//!
//! Verifies at startup that the external conversion tools can be spawned.
//! A missing tool only disables the conversions that need it, so the bot
//! starts anyway and the affected conversions fail with a clear message.

use crate::capabilities::ToolRunner;
use crate::config::Tool;
use tracing::{info, warn};

/// Result of pre-flight checks
#[derive(Debug, Default)]
pub struct PreflightResult {
    /// Tools that could not be spawned, with install hints
    pub missing_tools: Vec<String>,
}

impl PreflightResult {
    pub fn is_ready(&self) -> bool {
        self.missing_tools.is_empty()
    }

    /// Format for the startup log
    pub fn format_warnings(&self) -> String {
        if self.missing_tools.is_empty() {
            return String::new();
        }
        let mut msg = String::from("Missing tools (related conversions will fail):\n");
        for tool in &self.missing_tools {
            msg.push_str(&format!("  - {}\n", tool));
        }
        msg
    }
}

/// Package that provides a tool on Debian/Ubuntu
fn install_hint(tool: Tool) -> &'static str {
    match tool {
        Tool::Soffice => "apt install libreoffice",
        Tool::Img2Pdf => "apt install img2pdf",
        Tool::Pdftoppm | Tool::Pdftotext => "apt install poppler-utils",
        Tool::Ghostscript => "apt install ghostscript",
        Tool::Qpdf => "apt install qpdf",
        Tool::Tesseract => "apt install tesseract-ocr",
        Tool::Rembg => "pip install \"rembg[cli]\"",
        Tool::Magick => "apt install imagemagick",
        Tool::Ffmpeg => "apt install ffmpeg",
        Tool::Wkhtmltopdf => "apt install wkhtmltopdf",
        Tool::EspeakNg => "apt install espeak-ng",
        Tool::Qrencode => "apt install qrencode",
    }
}

/// Pre-flight checker for tool availability
pub struct PreflightChecker {
    runner: ToolRunner,
}

impl PreflightChecker {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    /// Probe every tool
    pub async fn check_all(&self) -> PreflightResult {
        let mut result = PreflightResult::default();
        for tool in Tool::ALL {
            if !self.runner.is_available(tool).await {
                result.missing_tools.push(format!(
                    "{} ({})",
                    self.runner.paths().program(tool).display(),
                    install_hint(tool)
                ));
            }
        }
        result
    }

    /// Check and log; never fails
    pub async fn report(&self) -> PreflightResult {
        let result = self.check_all().await;
        if result.is_ready() {
            info!("Pre-flight: all {} conversion tools available", Tool::ALL.len());
        } else {
            warn!("Pre-flight: {}", result.format_warnings().trim_end());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPaths;

    #[test]
    fn test_format_warnings() {
        let result = PreflightResult {
            missing_tools: vec!["qpdf (apt install qpdf)".to_string()],
        };
        assert!(!result.is_ready());
        let msg = result.format_warnings();
        assert!(msg.contains("Missing tools"));
        assert!(msg.contains("qpdf (apt install qpdf)"));

        assert!(PreflightResult::default().format_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tools_reported() {
        let mut paths = ToolPaths::default();
        for tool in Tool::ALL {
            paths.set(tool, "/nonexistent/convertbot-tool");
        }
        let checker = PreflightChecker::new(ToolRunner::new(paths));
        let result = checker.check_all().await;
        assert_eq!(result.missing_tools.len(), Tool::ALL.len());
        assert!(result.missing_tools[0].contains("apt install libreoffice"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawnable_tools_pass() {
        let mut paths = ToolPaths::default();
        for tool in Tool::ALL {
            paths.set(tool, "true");
        }
        let checker = PreflightChecker::new(ToolRunner::new(paths));
        assert!(checker.report().await.is_ready());
    }
}
