//! Combines structural-parse text with OCR text.

/// OCR text is appended only when it is longer than this share of the
/// structural text.
pub const DEFAULT_SUPPLEMENT_RATIO: f64 = 0.3;

/// Separator placed between structural text and supplementary OCR text.
pub const DEFAULT_SEPARATOR: &str = "\n\n---\n\n";

/// Length-ratio heuristic deciding whether OCR output supplements the
/// structural text.
///
/// Lengths are counted in Unicode scalar values so CJK and Latin input are
/// treated alike.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePolicy {
    pub supplement_ratio: f64,
    pub separator: String,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            supplement_ratio: DEFAULT_SUPPLEMENT_RATIO,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl MergePolicy {
    pub fn merge(&self, structural: &str, ocr: &str) -> String {
        if structural.is_empty() {
            return ocr.to_string();
        }
        if ocr.is_empty() {
            return structural.to_string();
        }

        let structural_len = structural.chars().count() as f64;
        let ocr_len = ocr.chars().count() as f64;

        if ocr_len > structural_len * self.supplement_ratio {
            let mut merged =
                String::with_capacity(structural.len() + self.separator.len() + ocr.len());
            merged.push_str(structural);
            merged.push_str(&self.separator);
            merged.push_str(ocr);
            merged
        } else {
            structural.to_string()
        }
    }
}

/// Merges with the default policy.
pub fn merge_texts(structural: &str, ocr: &str) -> String {
    MergePolicy::default().merge(structural, ocr)
}
