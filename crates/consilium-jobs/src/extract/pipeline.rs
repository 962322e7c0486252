//! Multi-strategy extraction pipeline.
//!
//! Strategy order for PDFs: direct text-layer extraction via `pdftotext`,
//! then rasterize (`pdftoppm`, falling back to `pdftocairo`) + recognize
//! (`tesseract`) per page. Raster images go straight to recognition.
//! Tool failures and timeouts never propagate; they degrade to the next
//! strategy and end up in the diagnostic.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

use consilium_core::{defaults, CommandRunner, Error, ExtractionDiagnostic, OcrMode, Result};

/// Strategy names recorded in diagnostics.
pub const TOOL_PDF_TEXT: &str = "pdf_text";
pub const TOOL_PDF_OCR: &str = "pdf_ocr";
pub const TOOL_IMAGE_OCR: &str = "image_ocr";
pub const TOOL_NONE: &str = "none";

/// Extraction pipeline configuration.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Maximum PDF pages rendered for the raster fallback.
    pub max_pages: u32,
    /// Rendering resolution for the raster fallback.
    pub dpi: u32,
    /// Recognition language set passed to tesseract.
    pub languages: String,
    /// Per-command timeout.
    pub tool_timeout: Duration,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_pages: defaults::OCR_MAX_PAGES,
            dpi: defaults::OCR_DPI,
            languages: defaults::OCR_LANGUAGES.to_string(),
            tool_timeout: Duration::from_secs(defaults::TOOL_TIMEOUT_SECS),
        }
    }
}

impl ExtractConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OCR_MAX_PAGES` | `20` | Pages rendered for the raster fallback |
    /// | `OCR_DPI` | `300` | Rendering resolution |
    /// | `OCR_LANGUAGES` | `eng+rus` | Tesseract language set |
    /// | `OCR_TOOL_TIMEOUT_SECS` | `60` | Per-command timeout |
    pub fn from_env() -> Self {
        let max_pages = std::env::var("OCR_MAX_PAGES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::OCR_MAX_PAGES)
            .max(1);
        let dpi = std::env::var("OCR_DPI")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::OCR_DPI);
        let languages =
            std::env::var("OCR_LANGUAGES").unwrap_or_else(|_| defaults::OCR_LANGUAGES.to_string());
        let tool_timeout = std::env::var("OCR_TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(defaults::TOOL_TIMEOUT_SECS));

        Self {
            max_pages,
            dpi,
            languages,
            tool_timeout,
        }
    }
}

/// Multi-strategy text extractor.
///
/// Stateless apart from its configuration: identical bytes, name hint, and
/// mode (with a stable tool set) yield identical results.
pub struct Extractor {
    runner: Arc<dyn CommandRunner>,
    config: ExtractConfig,
}

impl Extractor {
    /// Create a new extractor over the given command runner.
    pub fn new(runner: Arc<dyn CommandRunner>, config: ExtractConfig) -> Self {
        Self { runner, config }
    }

    /// Extract text from `content`.
    ///
    /// Returns the extracted text (possibly empty) and a diagnostic naming
    /// the strategy that succeeded or was last attempted. Only workspace
    /// I/O failures (temp files) surface as errors; tool failures are folded
    /// into the diagnostic.
    pub async fn extract(
        &self,
        content: &[u8],
        name_hint: &str,
        mode: OcrMode,
    ) -> Result<(String, ExtractionDiagnostic)> {
        let ext = extension_of(name_hint);

        if is_pdf(content, &ext) {
            return self.extract_pdf(content, mode).await;
        }
        if is_raster_image(content, &ext) {
            return self.extract_image(content, &ext, mode).await;
        }

        debug!(
            subsystem = "jobs",
            component = "extractor",
            name_hint,
            "No extraction strategy for input"
        );
        Ok((
            String::new(),
            ExtractionDiagnostic::failure(TOOL_NONE, mode, 127, "no extraction strategy for input"),
        ))
    }

    async fn extract_pdf(
        &self,
        content: &[u8],
        mode: OcrMode,
    ) -> Result<(String, ExtractionDiagnostic)> {
        let mut pdf_file = NamedTempFile::new()?;
        pdf_file.write_all(content)?;
        let pdf_path = pdf_file.path().to_string_lossy().to_string();

        // Step 1: direct text-layer extraction, unless the caller forces the
        // raster path.
        if mode != OcrMode::Image {
            let out = self
                .runner
                .run(
                    "pdftotext",
                    &[
                        "-layout".to_string(),
                        pdf_path.clone(),
                        "-".to_string(),
                    ],
                    None,
                    self.config.tool_timeout,
                )
                .await;
            let text = out.stdout_utf8();
            if out.code == 0 && text_layer_is_usable(&text) {
                return Ok((text, ExtractionDiagnostic::success(TOOL_PDF_TEXT, mode)));
            }
            debug!(
                subsystem = "jobs",
                component = "extractor",
                tool = TOOL_PDF_TEXT,
                code = out.code,
                "Text layer rejected, trying raster fallback"
            );
        }

        // Step 2: rasterize + recognize.
        let have_rasterizer = self.runner.available("pdftoppm").await
            || self.runner.available("pdftocairo").await;
        if !have_rasterizer || !self.runner.available("tesseract").await {
            return Ok((
                String::new(),
                ExtractionDiagnostic::failure(TOOL_PDF_OCR, mode, 1, "ocr tools unavailable"),
            ));
        }

        let pages_dir = TempDir::new()?;
        let prefix = pages_dir.path().join("page").to_string_lossy().to_string();

        let mut raster_error = String::new();
        let mut pages: Vec<PathBuf> = Vec::new();
        // pdftoppm is the primary rasterizer; pdftocairo covers PDFs that
        // crash it.
        for rasterizer in ["pdftoppm", "pdftocairo"] {
            let out = self
                .runner
                .run(
                    rasterizer,
                    &[
                        "-png".to_string(),
                        "-r".to_string(),
                        self.config.dpi.to_string(),
                        "-f".to_string(),
                        "1".to_string(),
                        "-l".to_string(),
                        self.config.max_pages.to_string(),
                        pdf_path.clone(),
                        prefix.clone(),
                    ],
                    None,
                    self.config.tool_timeout,
                )
                .await;
            if out.code != 0 {
                raster_error = out.stderr_utf8().trim().to_string();
                continue;
            }
            pages = rendered_pages(pages_dir.path())?;
            if pages.is_empty() {
                raster_error = "no pages rendered".to_string();
            } else {
                break;
            }
        }

        if pages.is_empty() {
            return Ok((
                String::new(),
                ExtractionDiagnostic::failure(TOOL_PDF_OCR, mode, 1, raster_error),
            ));
        }

        let preprocess = self.runner.available("convert").await;
        let mut page_texts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let input = if preprocess {
                self.preprocess_page(page, pages_dir.path(), i).await
            } else {
                page.clone()
            };

            let out = self
                .runner
                .run(
                    "tesseract",
                    &[
                        input.to_string_lossy().to_string(),
                        "stdout".to_string(),
                        "-l".to_string(),
                        self.config.languages.clone(),
                        "--oem".to_string(),
                        defaults::TESSERACT_OEM.to_string(),
                        "--psm".to_string(),
                        defaults::TESSERACT_PSM.to_string(),
                    ],
                    None,
                    self.config.tool_timeout,
                )
                .await;
            if out.code == 0 {
                page_texts.push(out.stdout_utf8());
            } else {
                warn!(
                    subsystem = "jobs",
                    component = "extractor",
                    tool = "tesseract",
                    page = i + 1,
                    code = out.code,
                    "Recognition failed for page, skipping"
                );
                page_texts.push(String::new());
            }
        }

        // Form feed between pages mirrors pdftotext's own page separator.
        let text = page_texts.join("\u{c}");
        if text.trim().is_empty() {
            Ok((
                String::new(),
                ExtractionDiagnostic::failure(TOOL_PDF_OCR, mode, 1, "empty_output"),
            ))
        } else {
            Ok((text, ExtractionDiagnostic::success(TOOL_PDF_OCR, mode)))
        }
    }

    /// Grayscale + normalize + contrast stretch + mild sharpen. Falls back
    /// to the raw page image when ImageMagick fails.
    async fn preprocess_page(&self, page: &Path, dir: &Path, index: usize) -> PathBuf {
        let processed = dir.join(format!("prep_{index}.png"));
        let out = self
            .runner
            .run(
                "convert",
                &[
                    page.to_string_lossy().to_string(),
                    "-colorspace".to_string(),
                    "Gray".to_string(),
                    "-normalize".to_string(),
                    "-contrast-stretch".to_string(),
                    "0.5%x0.5%".to_string(),
                    "-sharpen".to_string(),
                    "0x1".to_string(),
                    processed.to_string_lossy().to_string(),
                ],
                None,
                self.config.tool_timeout,
            )
            .await;
        if out.code == 0 && processed.exists() {
            processed
        } else {
            page.to_path_buf()
        }
    }

    async fn extract_image(
        &self,
        content: &[u8],
        ext: &str,
        mode: OcrMode,
    ) -> Result<(String, ExtractionDiagnostic)> {
        if !self.runner.available("tesseract").await {
            return Ok((
                String::new(),
                ExtractionDiagnostic::failure(TOOL_IMAGE_OCR, mode, 127, "tesseract unavailable"),
            ));
        }

        let dir = TempDir::new()?;
        let img_path = dir.path().join(format!("image.{ext}"));
        fs::write(&img_path, content)?;

        let out = self
            .runner
            .run(
                "tesseract",
                &[
                    img_path.to_string_lossy().to_string(),
                    "stdout".to_string(),
                    "-l".to_string(),
                    self.config.languages.clone(),
                    "--oem".to_string(),
                    defaults::TESSERACT_OEM.to_string(),
                    "--psm".to_string(),
                    defaults::TESSERACT_PSM.to_string(),
                ],
                None,
                self.config.tool_timeout,
            )
            .await;

        let text = out.stdout_utf8();
        if out.code == 0 && !text.trim().is_empty() {
            Ok((text, ExtractionDiagnostic::success(TOOL_IMAGE_OCR, mode)))
        } else {
            let error = if out.code == 0 {
                "empty_output".to_string()
            } else {
                out.stderr_utf8().trim().to_string()
            };
            Ok((
                String::new(),
                ExtractionDiagnostic::failure(TOOL_IMAGE_OCR, mode, out.code.max(1), error),
            ))
        }
    }
}

/// Lowercased filename extension, empty when absent.
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

fn is_pdf(content: &[u8], ext: &str) -> bool {
    ext == "pdf" || content.starts_with(b"%PDF")
}

fn is_raster_image(content: &[u8], ext: &str) -> bool {
    defaults::IMAGE_EXTENSIONS.contains(&ext)
        || infer::get(content).is_some_and(|t| t.matcher_type() == infer::MatcherType::Image)
}

/// Direct text-layer acceptance heuristic.
///
/// The text must be non-empty after stripping whitespace and control
/// characters, contain at least one alphabetic character, and carry an
/// alphabetic character within its head sample. The head check rejects PDFs
/// whose text layer is garbage up front with sparse real text trailing.
fn text_layer_is_usable(text: &str) -> bool {
    let has_visible = text.chars().any(|c| !c.is_whitespace() && !c.is_control());
    let has_alpha = text.chars().any(|c| c.is_alphabetic());
    let head_has_alpha = text
        .chars()
        .take(defaults::PDF_HEAD_SAMPLE_CHARS)
        .any(|c| c.is_alphabetic());
    has_visible && has_alpha && head_has_alpha
}

/// Rendered page images, sorted by filename for page order.
fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(Error::Io)? {
        let path = entry.map_err(Error::Io)?.path();
        let is_page = path.extension().and_then(|e| e.to_str()) == Some("png")
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("page"));
        if is_page {
            pages.push(path);
        }
    }
    pages.sort();
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use consilium_core::ToolOutput;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Deterministic command runner for pipeline tests. Successful raster
    /// invocations materialize page files the way the real tools would.
    struct FakeRunner {
        outputs: HashMap<String, ToolOutput>,
        available: HashSet<String>,
        rendered_pages: usize,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new() -> Self {
            Self {
                outputs: HashMap::new(),
                available: HashSet::new(),
                rendered_pages: 1,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_output(mut self, program: &str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.outputs.insert(
                program.to_string(),
                ToolOutput {
                    code,
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: stderr.as_bytes().to_vec(),
                },
            );
            self
        }

        fn with_available(mut self, program: &str) -> Self {
            self.available.insert(program.to_string());
            self
        }

        fn with_rendered_pages(mut self, n: usize) -> Self {
            self.rendered_pages = n;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _stdin: Option<&[u8]>,
            _timeout: Duration,
        ) -> ToolOutput {
            self.calls.lock().unwrap().push(program.to_string());

            let out = self.outputs.get(program).cloned().unwrap_or(ToolOutput {
                code: 127,
                stdout: Vec::new(),
                stderr: b"not configured".to_vec(),
            });

            if (program == "pdftoppm" || program == "pdftocairo") && out.code == 0 {
                let prefix = args.last().cloned().unwrap_or_default();
                for i in 1..=self.rendered_pages {
                    std::fs::write(format!("{prefix}-{i}.png"), b"png").unwrap();
                }
            }
            out
        }

        async fn available(&self, program: &str) -> bool {
            self.available.contains(program)
        }
    }

    fn extractor(runner: FakeRunner) -> Extractor {
        Extractor::new(Arc::new(runner), ExtractConfig::default())
    }

    #[tokio::test]
    async fn test_unsupported_input_yields_none() {
        let ex = extractor(FakeRunner::new());
        let (text, diag) = ex.extract(b"plain bytes", "notes.txt", OcrMode::Auto).await.unwrap();
        assert!(text.is_empty());
        assert!(!diag.ok);
        assert_eq!(diag.tool, TOOL_NONE);
        assert_eq!(diag.code, 127);
    }

    #[tokio::test]
    async fn test_pdf_text_layer_accepted() {
        let runner = FakeRunner::new().with_output("pdftotext", 0, "Hello extracted world", "");
        let ex = extractor(runner);
        let (text, diag) = ex.extract(b"%PDF-1.4 x", "doc.pdf", OcrMode::Auto).await.unwrap();
        assert_eq!(text, "Hello extracted world");
        assert!(diag.ok);
        assert_eq!(diag.tool, TOOL_PDF_TEXT);
        assert_eq!(diag.code, 0);
        assert!(diag.error.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_text_layer_falls_through_to_raster() {
        // Direct output is all whitespace; no OCR tools installed, so the
        // fallback fails too. The diagnostic must name the fallback.
        let runner = FakeRunner::new().with_output("pdftotext", 0, "  \n\t \n", "");
        let ex = extractor(runner);
        let (text, diag) = ex.extract(b"%PDF-1.4 x", "scan.pdf", OcrMode::Auto).await.unwrap();
        assert!(text.is_empty());
        assert!(!diag.ok);
        assert_eq!(diag.tool, TOOL_PDF_OCR);
    }

    #[tokio::test]
    async fn test_garbled_head_rejected_by_heuristic() {
        // Alphabetic text only after a long non-alphabetic head.
        let garbled = format!("{}{}", "0123456789".repeat(120), "real words here");
        let runner = FakeRunner::new().with_output("pdftotext", 0, &garbled, "");
        let ex = extractor(runner);
        let (_, diag) = ex.extract(b"%PDF-1.4 x", "doc.pdf", OcrMode::Auto).await.unwrap();
        assert!(!diag.ok);
        assert_eq!(diag.tool, TOOL_PDF_OCR);
    }

    #[tokio::test]
    async fn test_raster_fallback_succeeds() {
        let runner = FakeRunner::new()
            .with_output("pdftotext", 0, "", "")
            .with_output("pdftoppm", 0, "", "")
            .with_output("tesseract", 0, "recognized page text", "")
            .with_available("pdftoppm")
            .with_available("tesseract")
            .with_rendered_pages(2);
        let ex = extractor(runner);
        let (text, diag) = ex.extract(b"%PDF-1.4 x", "scan.pdf", OcrMode::Auto).await.unwrap();
        assert!(diag.ok);
        assert_eq!(diag.tool, TOOL_PDF_OCR);
        // Two pages joined by a form feed.
        assert_eq!(text, "recognized page text\u{c}recognized page text");
    }

    #[tokio::test]
    async fn test_secondary_rasterizer_covers_primary_failure() {
        let runner = FakeRunner::new()
            .with_output("pdftotext", 0, "", "")
            .with_output("pdftoppm", 1, "", "render crashed")
            .with_output("pdftocairo", 0, "", "")
            .with_output("tesseract", 0, "from cairo", "")
            .with_available("pdftoppm")
            .with_available("tesseract");
        let ex = extractor(runner);
        let (text, diag) = ex.extract(b"%PDF-1.4 x", "scan.pdf", OcrMode::Auto).await.unwrap();
        assert!(diag.ok);
        assert_eq!(text, "from cairo");
    }

    #[tokio::test]
    async fn test_raster_error_surfaces_when_fallback_fails() {
        let runner = FakeRunner::new()
            .with_output("pdftotext", 0, "", "")
            .with_output("pdftoppm", 1, "", "bad xref table")
            .with_output("pdftocairo", 1, "", "bad xref table")
            .with_available("pdftoppm")
            .with_available("tesseract");
        let ex = extractor(runner);
        let (text, diag) = ex.extract(b"%PDF-1.4 x", "scan.pdf", OcrMode::Auto).await.unwrap();
        assert!(text.is_empty());
        assert!(!diag.ok);
        assert_eq!(diag.tool, TOOL_PDF_OCR);
        assert_eq!(diag.error, "bad xref table");
    }

    #[tokio::test]
    async fn test_empty_recognition_reports_empty_output() {
        let runner = FakeRunner::new()
            .with_output("pdftotext", 0, "", "")
            .with_output("pdftoppm", 0, "", "")
            .with_output("tesseract", 0, "   ", "")
            .with_available("pdftoppm")
            .with_available("tesseract");
        let ex = extractor(runner);
        let (_, diag) = ex.extract(b"%PDF-1.4 x", "scan.pdf", OcrMode::Auto).await.unwrap();
        assert!(!diag.ok);
        assert_eq!(diag.error, "empty_output");
        assert_eq!(diag.code, 1);
    }

    #[tokio::test]
    async fn test_image_mode_skips_text_layer() {
        let runner = FakeRunner::new()
            .with_output("pdftotext", 0, "should never run", "")
            .with_output("pdftoppm", 0, "", "")
            .with_output("tesseract", 0, "ocr text", "")
            .with_available("pdftoppm")
            .with_available("tesseract");
        let ex = Extractor::new(Arc::new(runner), ExtractConfig::default());
        let (text, diag) = ex.extract(b"%PDF-1.4 x", "doc.pdf", OcrMode::Image).await.unwrap();
        assert!(diag.ok);
        assert_eq!(diag.tool, TOOL_PDF_OCR);
        assert_eq!(diag.mode, OcrMode::Image);
        assert_eq!(text, "ocr text");
    }

    #[tokio::test]
    async fn test_pdftotext_not_invoked_in_image_mode() {
        let runner = Arc::new(
            FakeRunner::new()
                .with_output("pdftotext", 0, "should never run", "")
                .with_output("pdftoppm", 0, "", "")
                .with_output("tesseract", 0, "ocr text", "")
                .with_available("pdftoppm")
                .with_available("tesseract"),
        );
        let ex = Extractor::new(runner.clone(), ExtractConfig::default());
        ex.extract(b"%PDF-1.4 x", "doc.pdf", OcrMode::Image).await.unwrap();
        assert!(!runner.calls().contains(&"pdftotext".to_string()));
    }

    #[tokio::test]
    async fn test_image_ocr_by_extension() {
        let runner = FakeRunner::new()
            .with_output("tesseract", 0, "sign text", "")
            .with_available("tesseract");
        let ex = extractor(runner);
        let (text, diag) = ex.extract(b"not a real png", "photo.PNG", OcrMode::Auto).await.unwrap();
        assert!(diag.ok);
        assert_eq!(diag.tool, TOOL_IMAGE_OCR);
        assert_eq!(text, "sign text");
    }

    #[tokio::test]
    async fn test_image_ocr_without_tesseract() {
        let ex = extractor(FakeRunner::new());
        let (text, diag) = ex.extract(b"img", "photo.jpg", OcrMode::Auto).await.unwrap();
        assert!(text.is_empty());
        assert!(!diag.ok);
        assert_eq!(diag.tool, TOOL_IMAGE_OCR);
        assert_eq!(diag.code, 127);
    }

    #[tokio::test]
    async fn test_extraction_is_deterministic() {
        let runner = FakeRunner::new().with_output("pdftotext", 0, "stable text", "");
        let ex = extractor(runner);
        let first = ex.extract(b"%PDF-1.4 x", "doc.pdf", OcrMode::Auto).await.unwrap();
        let second = ex.extract(b"%PDF-1.4 x", "doc.pdf", OcrMode::Auto).await.unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_text_layer_heuristic() {
        assert!(text_layer_is_usable("Hello"));
        assert!(text_layer_is_usable("  leading space then words"));
        assert!(!text_layer_is_usable(""));
        assert!(!text_layer_is_usable("   \n\t"));
        assert!(!text_layer_is_usable("1234 5678 ---"));
        // Cyrillic counts as alphabetic.
        assert!(text_layer_is_usable("Договор аренды"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("scan.PDF"), "pdf");
        assert_eq!(extension_of("a/b/photo.jpeg"), "jpeg");
        assert_eq!(extension_of("no_extension"), "");
    }

    #[test]
    fn test_pdf_detection_by_magic() {
        assert!(is_pdf(b"%PDF-1.7 ...", ""));
        assert!(is_pdf(b"anything", "pdf"));
        assert!(!is_pdf(b"plain", "txt"));
    }
}
