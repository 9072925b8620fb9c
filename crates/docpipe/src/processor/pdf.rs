use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::StageError;
use crate::metadata::Metadata;
use crate::processor::{InputKind, ParseOutput, StructuralParser};

/// Structural text extraction from the PDF text layer with `lopdf`.
///
/// Scanned PDFs without a usable text layer yield an empty text so that OCR
/// output takes over in the merge step.
#[derive(Debug, Clone, Default)]
pub struct LopdfParser;

impl LopdfParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StructuralParser for LopdfParser {
    async fn parse(&self, path: &Path) -> Result<ParseOutput, StageError> {
        if InputKind::from_path(path) != InputKind::Pdf {
            return Ok(ParseOutput::default());
        }

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || parse_pdf_file(&path))
            .await
            .map_err(|e| StageError::Parse(format!("Parser task aborted: {}", e)))?
    }

    fn name(&self) -> &str {
        "lopdf"
    }
}

fn parse_pdf_file(path: &Path) -> Result<ParseOutput, StageError> {
    let _span = tracing::info_span!("processor.pdf").entered();

    let pdf_bytes = std::fs::read(path).map_err(|e| StageError::ReadInput {
        path: path.to_path_buf(),
        source: e,
    })?;

    let doc = lopdf::Document::load_mem(&pdf_bytes)
        .map_err(|e| StageError::Parse(format!("Failed to load PDF: {}", e)))?;

    Ok(parse_document(&doc))
}

/// Builds text, per-page markup and table count from a loaded document.
pub fn parse_document(doc: &lopdf::Document) -> ParseOutput {
    let pages = doc.get_pages();
    let mut text = String::new();
    let mut markup = String::new();
    let mut table_count = 0;

    for page_num in pages.keys() {
        let page_text = match doc.extract_text(&[*page_num]) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("No text layer on page {}: {}", page_num, e);
                continue;
            }
        };
        let trimmed = page_text.trim();
        if trimmed.is_empty() {
            continue;
        }

        table_count += count_table_blocks(trimmed);

        text.push_str(trimmed);
        text.push('\n');

        markup.push_str(&format!("## Page {}\n\n{}\n\n", page_num, trimmed));
    }

    let mut metadata = Metadata::new();
    metadata.insert_new("pageCount", pages.len());

    if should_use_ocr(&text) {
        metadata.insert_new("textLayer", "unusable");
        return ParseOutput {
            metadata,
            ..Default::default()
        };
    }
    metadata.insert_new("textLayer", "ok");

    ParseOutput {
        text: text.trim_end().to_string(),
        markup: markup.trim_end().to_string(),
        metadata,
        table_count,
    }
}

static RE_COLUMN_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S(?:\t| {2,})\S").unwrap());

/// Counts runs of at least two consecutive lines that each have three or
/// more whitespace-aligned columns.
fn count_table_blocks(text: &str) -> usize {
    let mut tables = 0;
    let mut run = 0;

    for line in text.lines() {
        let gaps = RE_COLUMN_GAP.find_iter(line).count();
        if gaps >= 2 {
            run += 1;
            if run == 2 {
                tables += 1;
            }
        } else {
            run = 0;
        }
    }

    tables
}

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Text shorter than this is considered valid regardless of composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Below this alphanumeric percentage the text layer is treated as garbled.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// True when the text layer is empty, consists of font encoding error
/// markers, or is mostly non-alphanumeric noise.
fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");

    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

// ─── Page rendering (poppler) ───────────────────────────────────────────────

/// Page count from the PDF structure, falling back to `pdfinfo` when lopdf
/// cannot parse the file.
pub fn count_pdf_pages(pdf_path: &Path) -> Result<usize, String> {
    if let Ok(doc) = lopdf::Document::load(pdf_path) {
        return Ok(doc.get_pages().len());
    }

    let output = Command::new("pdfinfo").arg(pdf_path).output().map_err(|e| {
        format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        )
    })?;

    if !output.status.success() {
        return Err(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(count_str) = line.strip_prefix("Pages:") {
            if let Ok(count) = count_str.trim().parse::<usize>() {
                return Ok(count);
            }
        }
    }

    Ok(1)
}

/// Renders one page to PNG bytes with `pdftoppm`.
pub fn render_pdf_page_to_image(pdf_path: &Path, page_num: u32, dpi: u32) -> Result<Vec<u8>, String> {
    let scratch = tempfile::Builder::new()
        .prefix("docpipe_render_")
        .tempdir()
        .map_err(|e| format!("Failed to create scratch directory: {}", e))?;
    let output_prefix = scratch.path().join("page");

    let output = Command::new("pdftoppm")
        .arg("-png")
        .args(["-r", &dpi.to_string()])
        .args(["-f", &page_num.to_string()])
        .args(["-l", &page_num.to_string()])
        .arg(pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            )
        })?;

    if !output.status.success() {
        return Err(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    // pdftoppm zero-pads the page suffix depending on the page count
    let candidates: Vec<PathBuf> = [
        format!("page-{}.png", page_num),
        format!("page-{:02}.png", page_num),
        format!("page-{:03}.png", page_num),
    ]
    .iter()
    .map(|name| scratch.path().join(name))
    .collect();

    let image_path = candidates
        .iter()
        .find(|p| p.exists())
        .ok_or_else(|| "Failed to find rendered page image".to_string())?;

    std::fs::read(image_path).map_err(|e| format!("Failed to read rendered image: {}", e))
}
