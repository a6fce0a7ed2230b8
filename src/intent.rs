//! Text Intent Classification
//!
//! Free-form text is routed by ordered pattern match, first match wins:
//! a bare `start-end` page range, then an http(s) URL, then everything
//! else. What the range and the fallback actually do depends on whether
//! the user currently holds a PDF, see [`TextIntent::resolve`].

use once_cell::sync::Lazy;
use regex::Regex;

static PAGE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-(\d+)$").expect("valid page range pattern")
});

/// Pages requested by the user, as typed: 1-indexed, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

/// Zero-indexed half-open page span `[first, end)` within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub first: usize,
    pub end: usize,
}

impl PageSpan {
    pub fn len(&self) -> usize {
        self.end - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageRange {
    /// Clamp to a document with `page_count` pages.
    ///
    /// Returns `None` when nothing is left, e.g. the start lies past the
    /// last page. Page `0` is read as page `1`.
    pub fn clamp(&self, page_count: usize) -> Option<PageSpan> {
        let first = self.start.saturating_sub(1);
        let end = self.end.min(page_count);
        (first < end).then_some(PageSpan { first, end })
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextIntent {
    /// `text` keeps the input as typed for the QR fallback
    PageRangeSplit { range: PageRange, text: String },
    UrlCapture(String),
    QrOrSpeechFallback(String),
}

/// Concrete behavior once session state is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextAction {
    /// Extract pages from the held PDF
    SplitPages(PageRange),
    /// Render the page at this URL to PDF
    CaptureUrl(String),
    /// Encode the text as a QR image. Chosen when a range arrives with no
    /// PDF held, or when other text arrives while a PDF is held.
    QrCode(String),
    /// Read the text aloud
    Speech(String),
}

impl TextIntent {
    pub fn classify(raw: &str) -> Self {
        let text = raw.trim();

        if let Some(caps) = PAGE_RANGE.captures(text) {
            // Overflowing numbers fall through like any other text
            if let (Ok(start), Ok(end)) = (caps[1].parse(), caps[2].parse()) {
                return Self::PageRangeSplit {
                    range: PageRange { start, end },
                    text: text.to_string(),
                };
            }
        }

        if text.starts_with("http://") || text.starts_with("https://") {
            return Self::UrlCapture(text.to_string());
        }

        Self::QrOrSpeechFallback(text.to_string())
    }

    /// Pick the behavior given whether the session holds a PDF
    pub fn resolve(self, holds_pdf: bool) -> TextAction {
        match self {
            Self::PageRangeSplit { range, .. } if holds_pdf => TextAction::SplitPages(range),
            Self::PageRangeSplit { text, .. } => TextAction::QrCode(text),
            Self::UrlCapture(url) => TextAction::CaptureUrl(url),
            Self::QrOrSpeechFallback(text) if holds_pdf => TextAction::QrCode(text),
            Self::QrOrSpeechFallback(text) => TextAction::Speech(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range() {
        assert_eq!(
            TextIntent::classify("1-5"),
            TextIntent::PageRangeSplit {
                range: PageRange { start: 1, end: 5 },
                text: "1-5".to_string(),
            }
        );
        assert!(matches!(
            TextIntent::classify("  3-7 \n"),
            TextIntent::PageRangeSplit { range: PageRange { start: 3, end: 7 }, .. }
        ));
    }

    #[test]
    fn test_range_boundaries_fall_through() {
        for text in ["5-", "-5", "1-2-3", "1 - 5", "a-b", "-", "1–5"] {
            assert_eq!(
                TextIntent::classify(text),
                TextIntent::QrOrSpeechFallback(text.to_string()),
                "{:?} must not classify as a range",
                text
            );
        }
    }

    #[test]
    fn test_overflowing_range_falls_through() {
        let text = "1-99999999999999999999999999";
        assert_eq!(
            TextIntent::classify(text),
            TextIntent::QrOrSpeechFallback(text.to_string())
        );
    }

    #[test]
    fn test_url_capture() {
        assert_eq!(
            TextIntent::classify("https://example.com"),
            TextIntent::UrlCapture("https://example.com".to_string())
        );
        assert_eq!(
            TextIntent::classify("http://example.com/a?b=1"),
            TextIntent::UrlCapture("http://example.com/a?b=1".to_string())
        );
        // Scheme must lead
        assert!(matches!(
            TextIntent::classify("see https://example.com"),
            TextIntent::QrOrSpeechFallback(_)
        ));
    }

    #[test]
    fn test_resolve_without_pdf() {
        let speech = TextIntent::classify("hello world").resolve(false);
        assert_eq!(speech, TextAction::Speech("hello world".to_string()));

        let qr = TextIntent::classify("1-5").resolve(false);
        assert_eq!(qr, TextAction::QrCode("1-5".to_string()));

        let padded = TextIntent::classify("007-3").resolve(false);
        assert_eq!(padded, TextAction::QrCode("007-3".to_string()));
    }

    #[test]
    fn test_resolve_with_pdf() {
        let split = TextIntent::classify("2-4").resolve(true);
        assert_eq!(split, TextAction::SplitPages(PageRange { start: 2, end: 4 }));

        let qr = TextIntent::classify("1-2-3").resolve(true);
        assert_eq!(qr, TextAction::QrCode("1-2-3".to_string()));

        let url = TextIntent::classify("https://example.com").resolve(true);
        assert_eq!(url, TextAction::CaptureUrl("https://example.com".to_string()));
    }

    #[test]
    fn test_clamp_within_document() {
        let span = PageRange { start: 3, end: 7 }.clamp(10).unwrap();
        assert_eq!(span, PageSpan { first: 2, end: 7 });
        assert_eq!(span.len(), 5);
    }

    #[test]
    fn test_clamp_past_end() {
        let span = PageRange { start: 8, end: 20 }.clamp(10).unwrap();
        assert_eq!(span, PageSpan { first: 7, end: 10 });
        assert_eq!(span.len(), 3);
    }

    #[test]
    fn test_clamp_empty() {
        assert!(PageRange { start: 20, end: 25 }.clamp(10).is_none());
        assert!(PageRange { start: 5, end: 3 }.clamp(10).is_none());
        assert!(PageRange { start: 1, end: 5 }.clamp(0).is_none());
    }

    #[test]
    fn test_clamp_page_zero() {
        let span = PageRange { start: 0, end: 2 }.clamp(10).unwrap();
        assert_eq!(span, PageSpan { first: 0, end: 2 });
    }
}
