use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StageError;
use crate::processor::pdf::{count_pdf_pages, render_pdf_page_to_image};
use crate::processor::{BoundingBox, InputKind, OcrBlock, OcrEngine, OcrOutput};

/// Tesseract recognition through `leptess`.
///
/// Images are recognised directly; PDFs are rasterised page by page with
/// poppler first. A disabled engine returns an empty result.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    enabled: bool,
    languages: Vec<String>,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        Self {
            enabled: true,
            languages: languages.to_vec(),
            dpi,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            languages: Vec::new(),
            dpi: 300,
        }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Tesseract language string: request hints win over the configured set.
    pub fn language_string(&self, hints: &[String]) -> String {
        let chosen = if hints.is_empty() {
            &self.languages
        } else {
            hints
        };
        if chosen.is_empty() {
            "eng".to_string()
        } else {
            chosen.join("+")
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract(&self, path: &Path, languages: &[String]) -> Result<OcrOutput, StageError> {
        if !self.enabled {
            return Ok(OcrOutput::default());
        }

        let job = OcrJob {
            path: path.to_path_buf(),
            languages: self.language_string(languages),
            dpi: self.dpi,
        };

        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| StageError::Ocr(format!("OCR task aborted: {}", e)))?
    }

    async fn is_available(&self) -> bool {
        self.enabled
    }
}

struct OcrJob {
    path: PathBuf,
    languages: String,
    dpi: u32,
}

impl OcrJob {
    fn run(&self) -> Result<OcrOutput, StageError> {
        let _span = tracing::info_span!("processor.ocr", languages = %self.languages).entered();

        let mut lt = leptess::LepTess::new(None, &self.languages).map_err(|e| {
            StageError::Ocr(format!("Failed to initialize Tesseract: {}", e))
        })?;

        let blocks = match InputKind::from_path(&self.path) {
            InputKind::Image => {
                let image_data = std::fs::read(&self.path).map_err(|e| StageError::ReadInput {
                    path: self.path.clone(),
                    source: e,
                })?;
                recognize_page(&mut lt, &image_data, 1, None)?
            }
            InputKind::Pdf => self.recognize_pdf(&mut lt)?,
        };

        Ok(OcrOutput::from_blocks(blocks))
    }

    fn recognize_pdf(&self, lt: &mut leptess::LepTess) -> Result<Vec<OcrBlock>, StageError> {
        let page_count = count_pdf_pages(&self.path).map_err(StageError::Ocr)?;
        let mut blocks = Vec::new();

        for page_num in 1..=page_count as u32 {
            let image_data = match render_pdf_page_to_image(&self.path, page_num, self.dpi) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Skipping page {} for OCR: {}", page_num, e);
                    continue;
                }
            };
            match recognize_page(lt, &image_data, page_num, Some(self.dpi)) {
                Ok(page_blocks) => blocks.extend(page_blocks),
                Err(e) => tracing::warn!("OCR failed on page {}: {}", page_num, e),
            }
        }

        Ok(blocks)
    }
}

fn recognize_page(
    lt: &mut leptess::LepTess,
    image_data: &[u8],
    page: u32,
    dpi: Option<u32>,
) -> Result<Vec<OcrBlock>, StageError> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| StageError::Ocr(format!("Failed to load image: {}", e)))?;

    // leptess reads PNG from memory regardless of the source format
    let mut png_data = Vec::new();
    let mut cursor = Cursor::new(&mut png_data);
    img.write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| StageError::Ocr(format!("Failed to convert image: {}", e)))?;

    lt.set_image_from_mem(&png_data)
        .map_err(|e| StageError::Ocr(format!("Failed to set image for OCR: {}", e)))?;
    if let Some(dpi) = dpi {
        lt.set_source_resolution(dpi as i32);
    }

    let tsv = lt
        .get_tsv_text(0)
        .map_err(|e| StageError::Ocr(format!("OCR failed: {}", e)))?;

    Ok(parse_tsv(&tsv, page))
}

// ─── TSV parsing ────────────────────────────────────────────────────────────

const TSV_WORD_LEVEL: u32 = 5;

struct LineAccumulator {
    key: (u32, u32, u32),
    words: Vec<String>,
    confidence_sum: f32,
    bounding_box: BoundingBox,
}

impl LineAccumulator {
    fn finish(self, page: u32) -> OcrBlock {
        let count = self.words.len().max(1) as f32;
        OcrBlock {
            text: self.words.join(" "),
            confidence: (self.confidence_sum / count / 100.0).clamp(0.0, 1.0),
            bounding_box: self.bounding_box,
            page,
        }
    }
}

/// Groups Tesseract TSV word rows into line blocks.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Rows with negative confidence or empty
/// text are ignored.
pub fn parse_tsv(tsv: &str, page: u32) -> Vec<OcrBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().ok();

        let Some(level) = num(0) else { continue };
        if level != TSV_WORD_LEVEL {
            continue;
        }
        let Ok(confidence) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        let text = cols[11].trim();
        if confidence < 0.0 || text.is_empty() {
            continue;
        }

        let (Some(block), Some(par), Some(line)) = (num(2), num(3), num(4)) else {
            continue;
        };
        let bbox = BoundingBox {
            left: num(6).unwrap_or(0),
            top: num(7).unwrap_or(0),
            width: num(8).unwrap_or(0),
            height: num(9).unwrap_or(0),
        };
        let key = (block, par, line);

        match current {
            Some(ref mut acc) if acc.key == key => {
                acc.words.push(text.to_string());
                acc.confidence_sum += confidence;
                acc.bounding_box = acc.bounding_box.union(&bbox);
            }
            _ => {
                if let Some(done) = current.take() {
                    blocks.push(done.finish(page));
                }
                current = Some(LineAccumulator {
                    key,
                    words: vec![text.to_string()],
                    confidence_sum: confidence,
                    bounding_box: bbox,
                });
            }
        }
    }

    if let Some(done) = current {
        blocks.push(done.finish(page));
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t96.0\tInvoice
5\t1\t1\t1\t1\t2\t100\t12\t110\t18\t90.0\t#12345
5\t1\t1\t1\t2\t1\t10\t40\t60\t20\t80.0\tTotal:
5\t1\t1\t1\t2\t2\t80\t40\t40\t20\t-1\t
5\t1\t2\t1\t1\t1\t10\t90\t50\t20\t70.0\t發票";

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let blocks = parse_tsv(SAMPLE_TSV, 1);
        assert_eq!(blocks.len(), 3);

        assert_eq!(blocks[0].text, "Invoice #12345");
        assert!((blocks[0].confidence - 0.93).abs() < 1e-4);
        assert_eq!(
            blocks[0].bounding_box,
            BoundingBox { left: 10, top: 10, width: 200, height: 20 }
        );

        assert_eq!(blocks[1].text, "Total:");
        assert_eq!(blocks[2].text, "發票");
        assert!(blocks.iter().all(|b| b.page == 1));
    }

    #[test]
    fn test_parse_tsv_output_text() {
        let output = OcrOutput::from_blocks(parse_tsv(SAMPLE_TSV, 2));
        assert_eq!(output.full_text, "Invoice #12345\nTotal:\n發票");
        assert!(output.avg_confidence > 0.0 && output.avg_confidence <= 1.0);
        assert!(output.blocks.iter().all(|b| b.page == 2));
    }

    #[test]
    fn test_parse_tsv_ignores_garbage() {
        assert!(parse_tsv("", 1).is_empty());
        assert!(parse_tsv("not\ta\ttsv", 1).is_empty());
    }

    #[test]
    fn test_language_string() {
        let ocr = TesseractOcr::new(&["chi_tra".to_string(), "eng".to_string()], 300);
        assert_eq!(ocr.language_string(&[]), "chi_tra+eng");
        assert_eq!(ocr.language_string(&["deu".to_string()]), "deu");

        let bare = TesseractOcr::new(&[], 300);
        assert_eq!(bare.language_string(&[]), "eng");
    }

    #[tokio::test]
    async fn test_disabled_engine_returns_empty() {
        let ocr = TesseractOcr::disabled();
        let output = ocr
            .extract(Path::new("/nonexistent/scan.png"), &[])
            .await
            .unwrap();
        assert_eq!(output, OcrOutput::default());
        assert!(!ocr.is_available().await);
    }
}
