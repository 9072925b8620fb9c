//! Markdown header splitter.
//!
//! Cuts a document into sections at `#`, `##` and `###` headers. Header
//! lines are removed from the section text and recorded as `h1`/`h2`/`h3`
//! instead. Headers inside fenced code blocks are treated as text.

use crate::metadata::Metadata;

const MAX_HEADER_LEVEL: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub text: String,
    /// `h1`..`h3` values in effect for this section.
    pub headers: Metadata,
}

/// Level and title of an ATX header line, for levels 1 to 3.
fn parse_header(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > MAX_HEADER_LEVEL {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```") || line.starts_with("~~~")
}

struct SectionBuilder {
    sections: Vec<Section>,
    lines: Vec<String>,
}

impl SectionBuilder {
    fn flush(&mut self, headers: &[(usize, String)]) {
        let text = self.lines.join("\n");
        self.lines.clear();

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let headers: Metadata = headers
            .iter()
            .map(|(level, title)| (format!("h{}", level), title.clone()))
            .collect();
        self.sections.push(Section {
            text: trimmed.to_string(),
            headers,
        });
    }
}

/// Splits `text` into header-delimited sections, in document order.
/// Sections with no text are dropped.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut builder = SectionBuilder {
        sections: Vec::new(),
        lines: Vec::new(),
    };
    let mut active: Vec<(usize, String)> = Vec::new();
    let mut in_fence = false;

    for raw in text.lines() {
        let line = raw.trim();

        if is_fence(line) {
            in_fence = !in_fence;
            builder.lines.push(raw.to_string());
            continue;
        }

        if !in_fence {
            if let Some((level, title)) = parse_header(line) {
                builder.flush(&active);
                active.retain(|(l, _)| *l < level);
                active.push((level, title.to_string()));
                continue;
            }
        }

        if line.is_empty() {
            // paragraph break, collapsed when it would lead the section
            if !builder.lines.is_empty() {
                builder.lines.push(String::new());
            }
        } else if in_fence {
            builder.lines.push(raw.to_string());
        } else {
            builder.lines.push(line.to_string());
        }
    }

    builder.flush(&active);
    builder.sections
}
