//! Capabilities backed by command-line tools
//!
//! Outputs are named after the input (`<stem>_nobg.png`, `<stem>.pdf`, ...)
//! or, for text-driven capabilities, after the originating message. All of
//! them land in scratch storage as [`Artifact`]s, so an output a tool left
//! behind on failure is removed with its guard.

use super::tools::{ensure_output, ToolRunner};
use super::wiki::WikiClient;
use super::{Capabilities, CapabilityError, CapabilityOutput, CapabilityResult, PdfSource};
use crate::artifacts::{Artifact, ArtifactKind, ArtifactStore};
use crate::config::{Config, Tool};
use crate::intent::PageSpan;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Longest OCR text sent back in one message
const MAX_OCR_CHARS: usize = 4000;

/// Stickers are at most 512px on the long side
const STICKER_SIZE: &str = "512x512";

/// Clip length and frame rate for video -> GIF
#[derive(Debug, Clone, Copy)]
pub struct GifSettings {
    pub seconds: u32,
    pub fps: u32,
}

impl Default for GifSettings {
    fn default() -> Self {
        Self { seconds: 10, fps: 10 }
    }
}

pub struct ExternalCapabilities {
    runner: ToolRunner,
    artifacts: ArtifactStore,
    wiki: WikiClient,
    voice: String,
    ocr_language: String,
    gif: GifSettings,
}

impl ExternalCapabilities {
    pub fn new(
        runner: ToolRunner,
        artifacts: ArtifactStore,
        wiki: WikiClient,
    ) -> Self {
        Self {
            runner,
            artifacts,
            wiki,
            voice: "en".to_string(),
            ocr_language: "eng".to_string(),
            gif: GifSettings::default(),
        }
    }

    pub fn from_config(config: &Config, artifacts: ArtifactStore) -> Result<Self, CapabilityError> {
        let wiki = WikiClient::new(&config.language)?;
        Ok(Self {
            runner: ToolRunner::new(config.tools.clone()),
            artifacts,
            wiki,
            voice: config.language.clone(),
            ocr_language: config.ocr_language.clone(),
            gif: GifSettings {
                seconds: config.gif_seconds,
                fps: config.gif_fps,
            },
        })
    }

    pub fn runner(&self) -> &ToolRunner {
        &self.runner
    }

    /// LibreOffice writes `<outdir>/<input stem>.<ext>`
    async fn soffice_convert(
        &self,
        input: &Path,
        filter: &str,
        ext: &str,
        import_filter: Option<&str>,
    ) -> CapabilityResult {
        let output = self.artifacts.derive(input, &format!(".{}", ext));
        let mut args: Vec<OsString> = vec!["--headless".into()];
        if let Some(import_filter) = import_filter {
            args.push(format!("--infilter={}", import_filter).into());
        }
        args.extend([
            "--convert-to".into(),
            filter.into(),
            "--outdir".into(),
            self.artifacts.root().into(),
            input.into(),
        ]);
        self.runner.run_producing(Tool::Soffice, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    /// Single-output image conversion through ImageMagick
    async fn magick(&self, input: &Path, options: &[&str], suffix: &str) -> Result<Artifact, CapabilityError> {
        let output = self.artifacts.derive(input, suffix);
        let mut args: Vec<OsString> = vec![input.into()];
        args.extend(options.iter().map(OsString::from));
        args.push(output.path().into());
        self.runner.run_producing(Tool::Magick, args, output.path()).await?;
        Ok(output)
    }

    /// Page images written by pdftoppm: `<prefix>-<n>.png`, zero-padded
    /// to a common width, so a name sort is page order
    fn collect_pages(&self, prefix: &str) -> Result<Vec<Artifact>, CapabilityError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(self.artifacts.root())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(prefix) && n.ends_with(".png"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths
            .into_iter()
            .filter_map(|path| self.artifacts.adopt(path, ArtifactKind::Generated))
            .collect())
    }
}

#[async_trait]
impl Capabilities for ExternalCapabilities {
    async fn to_word_document(&self, input: &Path) -> CapabilityResult {
        self.soffice_convert(input, "docx:MS Word 2007 XML", "docx", Some("writer_pdf_import"))
            .await
    }

    async fn to_pdf(&self, input: &Path, source: PdfSource) -> CapabilityResult {
        match source {
            PdfSource::WordDocument => self.soffice_convert(input, "pdf", "pdf", None).await,
            PdfSource::Image => {
                let output = self.artifacts.derive(input, ".pdf");
                let args = vec![input.into(), "-o".into(), output.path().into()];
                self.runner.run_producing(Tool::Img2Pdf, args, output.path()).await?;
                Ok(CapabilityOutput::Document(output))
            }
        }
    }

    async fn to_images(&self, input: &Path) -> CapabilityResult {
        let stem = self.artifacts.derive(input, "_page");
        let prefix = stem.file_name();
        let args = vec![
            "-png".into(),
            "-r".into(),
            "150".into(),
            input.into(),
            stem.path().into(),
        ];
        let run = self.runner.run(Tool::Pdftoppm, args).await;
        // Collect before checking the result so partial pages are disposed too
        let pages = self.collect_pages(&format!("{}-", prefix))?;
        run?;
        if pages.is_empty() {
            return Err(CapabilityError::NoOutput(Tool::Pdftoppm.default_program()));
        }
        Ok(CapabilityOutput::Photos(pages))
    }

    async fn compress(&self, input: &Path) -> CapabilityResult {
        let output = self.artifacts.derive(input, "_compressed.pdf");
        let mut out_arg = OsString::from("-sOutputFile=");
        out_arg.push(output.path());
        let args = vec![
            "-sDEVICE=pdfwrite".into(),
            "-dCompatibilityLevel=1.4".into(),
            "-dPDFSETTINGS=/ebook".into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
            out_arg,
            input.into(),
        ];
        self.runner.run_producing(Tool::Ghostscript, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn page_count(&self, input: &Path) -> Result<usize, CapabilityError> {
        let output = self
            .runner
            .run(Tool::Qpdf, vec!["--show-npages".into(), input.into()])
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse().map_err(|_| {
            CapabilityError::tool_failed(Tool::Qpdf, format!("unexpected page count {:?}", stdout.trim()))
        })
    }

    async fn split_pages(&self, input: &Path, span: PageSpan, origin: &str) -> CapabilityResult {
        if span.is_empty() {
            return Err(CapabilityError::InvalidInput("empty page range".to_string()));
        }
        let output = self.artifacts.reserve(origin, "split.pdf");
        // qpdf page ranges are 1-indexed and inclusive
        let args = vec![
            "--empty".into(),
            "--pages".into(),
            input.into(),
            format!("{}-{}", span.first + 1, span.end).into(),
            "--".into(),
            output.path().into(),
        ];
        self.runner.run_producing(Tool::Qpdf, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn first_page_text(&self, input: &Path) -> Result<String, CapabilityError> {
        let args = vec![
            "-f".into(),
            "1".into(),
            "-l".into(),
            "1".into(),
            input.into(),
            "-".into(),
        ];
        let output = self.runner.run(Tool::Pdftotext, args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn summarize_topic(&self, seed_text: &str) -> CapabilityResult {
        let summary = self.wiki.summarize(seed_text).await?;
        Ok(CapabilityOutput::Text(summary.format()))
    }

    async fn ocr_text(&self, input: &Path) -> CapabilityResult {
        let args = vec![
            input.into(),
            "stdout".into(),
            "-l".into(),
            self.ocr_language.as_str().into(),
        ];
        let output = self.runner.run(Tool::Tesseract, args).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        let text = text.trim();
        if text.is_empty() {
            return Ok(CapabilityOutput::Text("❌ No text found in image.".to_string()));
        }
        let clipped: String = text.chars().take(MAX_OCR_CHARS).collect();
        Ok(CapabilityOutput::Text(format!("📝 Extracted Text:\n\n{}", clipped)))
    }

    async fn remove_background(&self, input: &Path) -> CapabilityResult {
        let output = self.artifacts.derive(input, "_nobg.png");
        let args = vec!["i".into(), input.into(), output.path().into()];
        self.runner.run_producing(Tool::Rembg, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn strip_image_metadata(&self, input: &Path) -> CapabilityResult {
        let output = self.magick(input, &["-strip"], "_safe.jpg").await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn to_png(&self, input: &Path) -> CapabilityResult {
        // A distinct suffix, so a PNG input is never overwritten in place
        let output = self.magick(input, &[], "_converted.png").await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn to_sticker(&self, input: &Path) -> CapabilityResult {
        let output = self
            .magick(input, &["-resize", STICKER_SIZE], "_sticker.webp")
            .await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn to_gif(&self, input: &Path) -> CapabilityResult {
        let output = self.artifacts.derive(input, ".gif");
        let filter = format!("fps={},scale=480:-1:flags=lanczos", self.gif.fps);
        let args = vec![
            "-y".into(),
            "-t".into(),
            self.gif.seconds.to_string().into(),
            "-i".into(),
            input.into(),
            "-vf".into(),
            filter.into(),
            output.path().into(),
        ];
        self.runner.run_producing(Tool::Ffmpeg, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn extract_audio(&self, input: &Path) -> CapabilityResult {
        let output = self.artifacts.derive(input, ".mp3");
        let args = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            "2".into(),
            output.path().into(),
        ];
        self.runner.run_producing(Tool::Ffmpeg, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn render_url_to_pdf(&self, url: &str, origin: &str) -> CapabilityResult {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CapabilityError::InvalidInput(format!("not a web address: {}", url)));
        }
        let output = self.artifacts.reserve(origin, "web.pdf");
        let args = vec![
            "--quiet".into(),
            "--page-size".into(),
            "A4".into(),
            url.into(),
            output.path().into(),
        ];
        self.runner.run_producing(Tool::Wkhtmltopdf, args, output.path()).await?;
        Ok(CapabilityOutput::Document(output))
    }

    async fn synthesize_speech(&self, text: &str, origin: &str) -> CapabilityResult {
        if text.trim().is_empty() {
            return Err(CapabilityError::InvalidInput("nothing to read aloud".to_string()));
        }
        let wav = self.artifacts.reserve(origin, "voice.wav");
        let args = vec![
            "-v".into(),
            self.voice.as_str().into(),
            "-w".into(),
            wav.path().into(),
            "--".into(),
            text.into(),
        ];
        self.runner.run_producing(Tool::EspeakNg, args, wav.path()).await?;

        // Telegram voice messages are OGG/Opus
        let voice = self.artifacts.reserve(origin, "voice.ogg");
        let args = vec![
            "-y".into(),
            "-i".into(),
            wav.path().into(),
            "-c:a".into(),
            "libopus".into(),
            voice.path().into(),
        ];
        self.runner.run(Tool::Ffmpeg, args).await?;
        ensure_output(Tool::Ffmpeg, voice.path()).await?;
        wav.dispose();
        Ok(CapabilityOutput::Voice(voice))
    }

    async fn make_qr_image(&self, text: &str, origin: &str) -> CapabilityResult {
        if text.is_empty() {
            return Err(CapabilityError::InvalidInput("nothing to encode".to_string()));
        }
        let output = self.artifacts.reserve(origin, "qr.png");
        let args = vec![
            "-o".into(),
            output.path().into(),
            "-s".into(),
            "8".into(),
            "--".into(),
            text.into(),
        ];
        self.runner.run_producing(Tool::Qrencode, args, output.path()).await?;
        Ok(CapabilityOutput::Photo(output))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolPaths;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Install a shell script standing in for `tool`
    fn fake_tool(dir: &Path, paths: &mut ToolPaths, tool: Tool, script: &str) {
        let path = dir.join(tool.default_program());
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        paths.set(tool, path);
    }

    fn capabilities(dir: &TempDir, paths: ToolPaths) -> (ExternalCapabilities, ArtifactStore) {
        let artifacts = ArtifactStore::open(dir.path().join("scratch")).unwrap();
        let wiki = WikiClient::with_base_url("http://127.0.0.1:9").unwrap();
        let caps = ExternalCapabilities::new(ToolRunner::new(paths), artifacts.clone(), wiki);
        (caps, artifacts)
    }

    #[tokio::test]
    async fn test_page_count_parses_qpdf_output() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        fake_tool(dir.path(), &mut paths, Tool::Qpdf, "echo 10");
        let (caps, _artifacts) = capabilities(&dir, paths);

        assert_eq!(caps.page_count(Path::new("in.pdf")).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_remove_background_output_under_scratch() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        // rembg i <in> <out>
        fake_tool(dir.path(), &mut paths, Tool::Rembg, "printf png > \"$3\"");
        let (caps, artifacts) = capabilities(&dir, paths);

        let input = artifacts.root().join("1_abcd_photo.jpg");
        std::fs::write(&input, b"jpg").unwrap();

        match caps.remove_background(&input).await.unwrap() {
            CapabilityOutput::Document(out) => {
                assert_eq!(out.file_name(), "1_abcd_photo_nobg.png");
                let path = out.path().to_path_buf();
                assert!(path.starts_with(artifacts.root()));
                out.dispose();
                assert!(!path.exists());
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_tool_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        // Writes a partial file, then fails
        fake_tool(
            dir.path(),
            &mut paths,
            Tool::Magick,
            "for last; do :; done; printf partial > \"$last\"; echo 'corrupt image' >&2; exit 1",
        );
        let (caps, artifacts) = capabilities(&dir, paths);

        let input = artifacts.root().join("2_abcd_photo.jpg");
        std::fs::write(&input, b"jpg").unwrap();

        let err = caps.to_png(&input).await.unwrap_err();
        assert_eq!(err.to_string(), "magick failed: corrupt image");
        assert!(!artifacts.root().join("2_abcd_photo_converted.png").exists());
    }

    #[tokio::test]
    async fn test_to_png_never_overwrites_png_input() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        // magick <in> <out>
        fake_tool(dir.path(), &mut paths, Tool::Magick, "printf converted > \"$2\"");
        let (caps, artifacts) = capabilities(&dir, paths);

        let input = artifacts.reserve("4", "screenshot.png");
        std::fs::write(input.path(), b"original").unwrap();

        match caps.to_png(input.path()).await.unwrap() {
            CapabilityOutput::Document(out) => {
                assert_ne!(out.path(), input.path());
                assert!(out.file_name().ends_with("_screenshot_converted.png"));
                assert_eq!(std::fs::read(out.path()).unwrap(), b"converted");
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(std::fs::read(input.path()).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_soffice_output_found_for_long_upload_names() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        // Mimics LibreOffice: <outdir>/<input stem>.docx
        fake_tool(
            dir.path(),
            &mut paths,
            Tool::Soffice,
            "while [ $# -gt 0 ]; do case \"$1\" in --outdir) outdir=\"$2\"; shift;; esac; src=\"$1\"; shift; done; printf docx > \"$outdir/$(basename \"$src\" .pdf).docx\"",
        );
        let (caps, artifacts) = capabilities(&dir, paths);

        let input = artifacts
            .acquire(
                ArtifactKind::Document,
                "123456",
                "annual_financial_statement_of_the_company_for_fiscal_year_2024_final_v2_signed.pdf",
                b"%PDF",
            )
            .await
            .unwrap();

        match caps.to_word_document(input.path()).await.unwrap() {
            CapabilityOutput::Document(out) => {
                assert!(out.exists());
                out.dispose();
            }
            other => panic!("unexpected output {:?}", other),
        }
        input.dispose();
        assert_eq!(std::fs::read_dir(artifacts.root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_to_images_collects_pages_in_order() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        // pdftoppm -png -r 150 <in> <prefix>
        fake_tool(
            dir.path(),
            &mut paths,
            Tool::Pdftoppm,
            "for i in 01 02 10; do printf p > \"$5-$i.png\"; done",
        );
        let (caps, artifacts) = capabilities(&dir, paths);

        let input = artifacts.root().join("3_abcd_doc.pdf");
        std::fs::write(&input, b"%PDF").unwrap();

        match caps.to_images(&input).await.unwrap() {
            CapabilityOutput::Photos(pages) => {
                let names: Vec<String> = pages.iter().map(Artifact::file_name).collect();
                assert_eq!(
                    names,
                    vec![
                        "3_abcd_doc_page-01.png",
                        "3_abcd_doc_page-02.png",
                        "3_abcd_doc_page-10.png"
                    ]
                );
            }
            other => panic!("unexpected output {:?}", other),
        }
        // Guards dropped with the output
        assert_eq!(std::fs::read_dir(artifacts.root()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_ocr_empty_text() {
        let dir = TempDir::new().unwrap();
        let mut paths = ToolPaths::default();
        fake_tool(dir.path(), &mut paths, Tool::Tesseract, "echo '   '");
        let (caps, _artifacts) = capabilities(&dir, paths);

        match caps.ocr_text(Path::new("x.jpg")).await.unwrap() {
            CapabilityOutput::Text(text) => assert_eq!(text, "❌ No text found in image."),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_render_rejects_non_http() {
        let dir = TempDir::new().unwrap();
        let (caps, _artifacts) = capabilities(&dir, ToolPaths::default());
        let err = caps.render_url_to_pdf("file:///etc/passwd", "1").await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(_)));
    }
}
