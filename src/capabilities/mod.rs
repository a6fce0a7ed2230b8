//! Conversion Capabilities
//!
//! Each capability is an opaque conversion: it takes an input file (or
//! text) and either produces a result under scratch storage or fails with
//! a [`CapabilityError`] whose message is shown to the user as-is.
//! Capabilities are never retried.
//!
//! - [`ExternalCapabilities`]: shells out to command-line tools
//!   (LibreOffice, poppler, qpdf, Ghostscript, Tesseract, rembg,
//!   ImageMagick, ffmpeg, wkhtmltopdf, espeak-ng, qrencode) and looks up
//!   summaries on Wikipedia.

pub mod external;
pub mod tools;
pub mod wiki;

pub use external::{ExternalCapabilities, GifSettings};
pub use tools::ToolRunner;
pub use wiki::WikiClient;

use crate::artifacts::Artifact;
use crate::config::Tool;
use crate::intent::PageSpan;
use async_trait::async_trait;
use std::path::Path;

/// Error types for capability invocations
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("{0} is not installed on the server")]
    ToolMissing(&'static str),

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: &'static str, detail: String },

    #[error("{0} produced no output")]
    NoOutput(&'static str),

    #[error("pages {start}-{end} are outside the document ({page_count} pages)")]
    EmptyPageRange {
        start: usize,
        end: usize,
        page_count: usize,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    pub(crate) fn tool_failed(tool: Tool, detail: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.default_program(),
            detail: detail.into(),
        }
    }
}

/// What a capability hands back
#[derive(Debug)]
pub enum CapabilityOutput {
    /// Sent as a document (PDF, DOCX, GIF, MP3, ...)
    Document(Artifact),
    /// Sent as a photo
    Photo(Artifact),
    /// Sent as a voice message
    Voice(Artifact),
    /// Several photos, sent in order (PDF pages)
    Photos(Vec<Artifact>),
    /// Plain text reply (OCR, wiki summary)
    Text(String),
}

pub type CapabilityResult = Result<CapabilityOutput, CapabilityError>;

/// Source format for PDF conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfSource {
    Image,
    WordDocument,
}

/// External conversion capabilities, one call per conversion
#[async_trait]
pub trait Capabilities: Send + Sync {
    async fn to_word_document(&self, input: &Path) -> CapabilityResult;

    async fn to_pdf(&self, input: &Path, source: PdfSource) -> CapabilityResult;

    /// Render every page to PNG
    async fn to_images(&self, input: &Path) -> CapabilityResult;

    async fn compress(&self, input: &Path) -> CapabilityResult;

    /// Number of pages in a PDF
    async fn page_count(&self, input: &Path) -> Result<usize, CapabilityError>;

    /// Copy the pages of `span` into a new PDF
    async fn split_pages(&self, input: &Path, span: PageSpan, origin: &str) -> CapabilityResult;

    /// Text of the first page, used to seed the summary lookup
    async fn first_page_text(&self, input: &Path) -> Result<String, CapabilityError>;

    async fn summarize_topic(&self, seed_text: &str) -> CapabilityResult;

    async fn ocr_text(&self, input: &Path) -> CapabilityResult;

    async fn remove_background(&self, input: &Path) -> CapabilityResult;

    async fn strip_image_metadata(&self, input: &Path) -> CapabilityResult;

    async fn to_png(&self, input: &Path) -> CapabilityResult;

    async fn to_sticker(&self, input: &Path) -> CapabilityResult;

    async fn to_gif(&self, input: &Path) -> CapabilityResult;

    async fn extract_audio(&self, input: &Path) -> CapabilityResult;

    async fn render_url_to_pdf(&self, url: &str, origin: &str) -> CapabilityResult;

    async fn synthesize_speech(&self, text: &str, origin: &str) -> CapabilityResult;

    async fn make_qr_image(&self, text: &str, origin: &str) -> CapabilityResult;
}
