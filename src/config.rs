//! Configuration management

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// External command-line tools the conversion capabilities shell out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// LibreOffice (PDF <-> Word)
    Soffice,
    /// img2pdf (photo -> PDF)
    Img2Pdf,
    /// poppler pdftoppm (PDF -> PNG pages)
    Pdftoppm,
    /// poppler pdftotext (first page text for wiki lookup)
    Pdftotext,
    /// Ghostscript (PDF compression)
    Ghostscript,
    /// qpdf (page count + page extraction)
    Qpdf,
    Tesseract,
    Rembg,
    /// ImageMagick (metadata strip, PNG, sticker)
    Magick,
    Ffmpeg,
    Wkhtmltopdf,
    EspeakNg,
    Qrencode,
}

impl Tool {
    pub const ALL: [Tool; 13] = [
        Tool::Soffice,
        Tool::Img2Pdf,
        Tool::Pdftoppm,
        Tool::Pdftotext,
        Tool::Ghostscript,
        Tool::Qpdf,
        Tool::Tesseract,
        Tool::Rembg,
        Tool::Magick,
        Tool::Ffmpeg,
        Tool::Wkhtmltopdf,
        Tool::EspeakNg,
        Tool::Qrencode,
    ];

    /// Program name looked up on PATH when no override is configured
    pub fn default_program(&self) -> &'static str {
        match self {
            Tool::Soffice => "soffice",
            Tool::Img2Pdf => "img2pdf",
            Tool::Pdftoppm => "pdftoppm",
            Tool::Pdftotext => "pdftotext",
            Tool::Ghostscript => "gs",
            Tool::Qpdf => "qpdf",
            Tool::Tesseract => "tesseract",
            Tool::Rembg => "rembg",
            Tool::Magick => "magick",
            Tool::Ffmpeg => "ffmpeg",
            Tool::Wkhtmltopdf => "wkhtmltopdf",
            Tool::EspeakNg => "espeak-ng",
            Tool::Qrencode => "qrencode",
        }
    }

    /// Environment variable that overrides the program path
    pub fn env_var(&self) -> &'static str {
        match self {
            Tool::Soffice => "CONVERTBOT_SOFFICE_BIN",
            Tool::Img2Pdf => "CONVERTBOT_IMG2PDF_BIN",
            Tool::Pdftoppm => "CONVERTBOT_PDFTOPPM_BIN",
            Tool::Pdftotext => "CONVERTBOT_PDFTOTEXT_BIN",
            Tool::Ghostscript => "CONVERTBOT_GS_BIN",
            Tool::Qpdf => "CONVERTBOT_QPDF_BIN",
            Tool::Tesseract => "CONVERTBOT_TESSERACT_BIN",
            Tool::Rembg => "CONVERTBOT_REMBG_BIN",
            Tool::Magick => "CONVERTBOT_MAGICK_BIN",
            Tool::Ffmpeg => "CONVERTBOT_FFMPEG_BIN",
            Tool::Wkhtmltopdf => "CONVERTBOT_WKHTMLTOPDF_BIN",
            Tool::EspeakNg => "CONVERTBOT_ESPEAK_BIN",
            Tool::Qrencode => "CONVERTBOT_QRENCODE_BIN",
        }
    }

    /// Argument that makes the tool print its version and exit
    pub fn version_arg(&self) -> &'static str {
        match self {
            Tool::Pdftoppm | Tool::Pdftotext => "-v",
            Tool::Ffmpeg => "-version",
            _ => "--version",
        }
    }
}

/// Resolved program path for every external tool
#[derive(Debug, Clone)]
pub struct ToolPaths {
    paths: HashMap<Tool, PathBuf>,
}

impl ToolPaths {
    /// Load overrides from `CONVERTBOT_<TOOL>_BIN`, defaulting to PATH lookup
    pub fn from_env() -> Self {
        let paths = Tool::ALL
            .iter()
            .map(|tool| {
                let program = std::env::var(tool.env_var())
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| expand_path(&v))
                    .unwrap_or_else(|| PathBuf::from(tool.default_program()));
                (*tool, program)
            })
            .collect();
        Self { paths }
    }

    pub fn program(&self, tool: Tool) -> &Path {
        self.paths
            .get(&tool)
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(tool.default_program()))
    }

    pub fn set(&mut self, tool: Tool, program: impl Into<PathBuf>) {
        self.paths.insert(tool, program.into());
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        let paths = Tool::ALL
            .iter()
            .map(|tool| (*tool, PathBuf::from(tool.default_program())))
            .collect();
        Self { paths }
    }
}

/// Follow button shown on the onboarding prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingLink {
    pub label: String,
    pub url: String,
}

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (required)
    pub bot_token: String,

    /// Scratch directory for uploaded and generated artifacts
    pub scratch_dir: PathBuf,

    /// SQLite database holding the verification ledger
    pub ledger_path: PathBuf,

    /// Links users are asked to follow before verifying
    pub onboarding_links: Vec<OnboardingLink>,

    /// Language for speech synthesis and Wikipedia lookups
    pub language: String,

    /// Tesseract language pack
    pub ocr_language: String,

    /// Length of the clip turned into a GIF
    pub gif_seconds: u32,

    /// GIF frame rate
    pub gif_fps: u32,

    /// External tool locations
    pub tools: ToolPaths,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails when the bot token is missing: the bot must not start degraded.
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            bail!("TELEGRAM_BOT_TOKEN is not set");
        }

        let scratch_dir = std::env::var("CONVERTBOT_SCRATCH_DIR")
            .map(|v| expand_path(&v))
            .unwrap_or_else(|_| PathBuf::from("temp_files"));

        let ledger_path = std::env::var("CONVERTBOT_LEDGER_PATH")
            .map(|v| expand_path(&v))
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("convertbot")
                    .join("verified_users.db")
            });

        let onboarding_links = std::env::var("CONVERTBOT_ONBOARDING_LINKS")
            .map(|v| parse_onboarding_links(&v))
            .unwrap_or_default();

        let language = std::env::var("CONVERTBOT_LANGUAGE")
            .unwrap_or_else(|_| "en".to_string());

        let ocr_language = std::env::var("CONVERTBOT_OCR_LANGUAGE")
            .unwrap_or_else(|_| "eng".to_string());

        let gif_seconds = std::env::var("CONVERTBOT_GIF_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let gif_fps = std::env::var("CONVERTBOT_GIF_FPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            bot_token,
            scratch_dir,
            ledger_path,
            onboarding_links,
            language,
            ocr_language,
            gif_seconds,
            gif_fps,
            tools: ToolPaths::from_env(),
        })
    }
}

/// Parse `Label|url;Label|url`, skipping malformed entries
pub fn parse_onboarding_links(raw: &str) -> Vec<OnboardingLink> {
    raw.split(';')
        .filter_map(|entry| {
            let (label, url) = entry.split_once('|')?;
            let (label, url) = (label.trim(), url.trim());
            if label.is_empty() || !(url.starts_with("https://") || url.starts_with("http://")) {
                return None;
            }
            Some(OnboardingLink {
                label: label.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onboarding_links() {
        let links = parse_onboarding_links(
            "YouTube|https://youtube.com/@x; Broken ;NoUrl|ftp://x;Insta | https://instagram.com/y",
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].label, "YouTube");
        assert_eq!(links[1].url, "https://instagram.com/y");
    }

    #[test]
    fn test_default_tool_paths() {
        let tools = ToolPaths::default();
        assert_eq!(tools.program(Tool::Ghostscript), Path::new("gs"));
        assert_eq!(tools.program(Tool::EspeakNg), Path::new("espeak-ng"));
    }

    #[test]
    fn test_tool_override() {
        let mut tools = ToolPaths::default();
        tools.set(Tool::Qpdf, "/opt/qpdf/bin/qpdf");
        assert_eq!(tools.program(Tool::Qpdf), Path::new("/opt/qpdf/bin/qpdf"));
    }

    #[test]
    fn test_version_args() {
        assert_eq!(Tool::Ffmpeg.version_arg(), "-version");
        assert_eq!(Tool::Pdftoppm.version_arg(), "-v");
        assert_eq!(Tool::Tesseract.version_arg(), "--version");
    }
}
