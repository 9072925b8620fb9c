//! Content extraction collaborators: structural parsing and OCR.

pub mod ocr;
pub mod pdf;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::metadata::Metadata;

pub use ocr::TesseractOcr;
pub use pdf::LopdfParser;

/// Extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tiff", "tif", "bmp", "webp"];

/// Broad class of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    /// `.pdf` is a PDF, everything else is treated as an image.
    pub fn from_path(path: &Path) -> Self {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            InputKind::Pdf
        } else {
            InputKind::Image
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Pdf => "pdf",
            InputKind::Image => "image",
        }
    }
}

pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// MIME type guessed from the file extension.
pub fn mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Output of a structural parse. `Default` is the "nothing extracted" result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub text: String,
    /// Layout-aware markdown rendering of `text`.
    pub markup: String,
    pub metadata: Metadata,
    pub table_count: usize,
}

impl ParseOutput {
    /// Markup when available, plain text otherwise.
    pub fn best_text(&self) -> &str {
        if self.markup.trim().is_empty() {
            &self.text
        } else {
            &self.markup
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        BoundingBox {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// One recognised line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrBlock {
    pub text: String,
    /// Recognition confidence in `0.0..=1.0`.
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub full_text: String,
    pub blocks: Vec<OcrBlock>,
    pub avg_confidence: f32,
}

impl OcrOutput {
    pub fn from_blocks(blocks: Vec<OcrBlock>) -> Self {
        let full_text = blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let avg_confidence = if blocks.is_empty() {
            0.0
        } else {
            blocks.iter().map(|b| b.confidence).sum::<f32>() / blocks.len() as f32
        };
        Self {
            full_text,
            blocks,
            avg_confidence,
        }
    }
}

/// Layout-aware text extraction for document-like inputs.
#[async_trait]
pub trait StructuralParser: Send + Sync {
    /// May return `ParseOutput::default()` when the input type is not
    /// supported.
    async fn parse(&self, path: &Path) -> Result<ParseOutput, StageError>;

    fn name(&self) -> &str;
}

/// Optical character recognition.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// `languages` are hints; an empty slice selects the engine default.
    async fn extract(&self, path: &Path, languages: &[String]) -> Result<OcrOutput, StageError>;

    async fn is_available(&self) -> bool;
}
