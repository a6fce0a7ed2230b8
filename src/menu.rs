//! Conversion menus
//!
//! The table in [`build_menu`] is the single source of truth for which
//! action tokens are legal for which upload category. Buttons carry the
//! token string; [`Action::decode`] turns it back into an [`Action`] and
//! the dispatcher only accepts it if [`offers`] says the current upload's
//! category lists it.

use crate::artifacts::ArtifactKind;
use std::path::Path;

/// Token of the onboarding acknowledgment button
pub const VERIFY_TOKEN: &str = "verify_me";

/// Upload category, derived once at upload time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    /// Paginated document
    Pdf,
    WordDocument,
    Photo,
    Video,
    Unrecognized,
}

impl FileCategory {
    /// Categorize an upload from its transport kind and file name
    pub fn detect(kind: ArtifactKind, file_name: &str) -> Self {
        match kind {
            ArtifactKind::Photo => return Self::Photo,
            ArtifactKind::Video => return Self::Video,
            ArtifactKind::Document | ArtifactKind::Generated => {}
        }

        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => return Self::Pdf,
            "docx" => return Self::WordDocument,
            _ => {}
        }

        // Photos and videos sent "as file" still get their menus
        match mime_guess::from_path(file_name).first() {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => Self::Photo,
            Some(mime) if mime.type_() == mime_guess::mime::VIDEO => Self::Video,
            _ => Self::Unrecognized,
        }
    }

    pub fn is_paginated(&self) -> bool {
        matches!(self, Self::Pdf)
    }

    /// Header shown above the menu
    pub fn menu_title(&self, file_name: &str) -> String {
        match self {
            Self::Photo => "Image Tools Dashboard:".to_string(),
            Self::Video => "Video Processing Options:".to_string(),
            _ => format!("Options for {}:", file_name),
        }
    }
}

/// A conversion backed by an external capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    PdfToWord,
    WikiSummary,
    PdfToImages,
    CompressPdf,
    WordToPdf,
    ImageToPdf,
    Ocr,
    RemoveBackground,
    StripMetadata,
    ToPng,
    ToSticker,
    ToGif,
    ToMp3,
}

/// Anything a menu button can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Convert(Conversion),
    /// Explain how to request a page range; no capability involved
    SplitHint,
}

impl Action {
    /// Callback data carried by the button
    pub fn token(&self) -> &'static str {
        match self {
            Self::SplitHint => "split_hint",
            Self::Convert(conversion) => match conversion {
                Conversion::PdfToWord => "to_docx",
                Conversion::WikiSummary => "wiki_summary",
                Conversion::PdfToImages => "to_images",
                Conversion::CompressPdf => "compress_pdf",
                Conversion::WordToPdf => "docx_to_pdf",
                Conversion::ImageToPdf => "to_pdf",
                Conversion::Ocr => "ocr",
                Conversion::RemoveBackground => "remove_bg",
                Conversion::StripMetadata => "strip_metadata",
                Conversion::ToPng => "to_png",
                Conversion::ToSticker => "to_sticker",
                Conversion::ToGif => "to_gif",
                Conversion::ToMp3 => "to_mp3",
            },
        }
    }

    /// Parse callback data. Unknown tokens yield `None`.
    pub fn decode(token: &str) -> Option<Self> {
        let conversion = match token {
            "split_hint" => return Some(Self::SplitHint),
            "to_docx" => Conversion::PdfToWord,
            "wiki_summary" => Conversion::WikiSummary,
            "to_images" => Conversion::PdfToImages,
            "compress_pdf" => Conversion::CompressPdf,
            "docx_to_pdf" => Conversion::WordToPdf,
            "to_pdf" => Conversion::ImageToPdf,
            "ocr" => Conversion::Ocr,
            "remove_bg" => Conversion::RemoveBackground,
            "strip_metadata" => Conversion::StripMetadata,
            "to_png" => Conversion::ToPng,
            "to_sticker" => Conversion::ToSticker,
            "to_gif" => Conversion::ToGif,
            "to_mp3" => Conversion::ToMp3,
            _ => return None,
        };
        Some(Self::Convert(conversion))
    }

    /// Button label
    pub fn label(&self) -> &'static str {
        match self {
            Self::SplitHint => "✂️ Split PDF",
            Self::Convert(conversion) => match conversion {
                Conversion::PdfToWord => "📄 to Word",
                Conversion::WikiSummary => "📖 Wiki Info",
                Conversion::PdfToImages => "🖼️ to Images",
                Conversion::CompressPdf => "📉 Compress",
                Conversion::WordToPdf | Conversion::ImageToPdf => "📕 to PDF",
                Conversion::Ocr => "🔍 OCR (Text)",
                Conversion::RemoveBackground => "✨ Remove BG",
                Conversion::StripMetadata => "🛡️ Strip Meta",
                Conversion::ToPng => "🖼️ PNG",
                Conversion::ToSticker => "🎭 Sticker",
                Conversion::ToGif => "📽️ to GIF",
                Conversion::ToMp3 => "🎵 to MP3",
            },
        }
    }
}

/// One menu button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: &'static str,
    pub action: Action,
}

impl MenuEntry {
    pub fn token(&self) -> &'static str {
        self.action.token()
    }
}

fn actions_for(category: FileCategory) -> &'static [Action] {
    use Action::{Convert, SplitHint};
    use Conversion::*;

    match category {
        FileCategory::Pdf => &[
            Convert(PdfToWord),
            Convert(WikiSummary),
            Convert(PdfToImages),
            Convert(CompressPdf),
            SplitHint,
        ],
        FileCategory::WordDocument => &[Convert(WordToPdf)],
        FileCategory::Photo => &[
            Convert(ImageToPdf),
            Convert(Ocr),
            Convert(RemoveBackground),
            Convert(StripMetadata),
            Convert(ToPng),
            Convert(ToSticker),
        ],
        FileCategory::Video => &[Convert(ToGif), Convert(ToMp3)],
        FileCategory::Unrecognized => &[],
    }
}

/// Ordered menu for an upload category. Empty for unrecognized uploads.
pub fn build_menu(category: FileCategory) -> Vec<MenuEntry> {
    actions_for(category)
        .iter()
        .map(|action| MenuEntry {
            label: action.label(),
            action: *action,
        })
        .collect()
}

/// Is `action` legal for an upload of this category?
pub fn offers(category: FileCategory, action: Action) -> bool {
    actions_for(category).contains(&action)
}
