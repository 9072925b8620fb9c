//! Recursive character splitter.
//!
//! Splits on the coarsest separator present in the text, recursing into
//! pieces that are still too long with the finer separators, then greedily
//! merges small pieces back up to `chunk_size` with `chunk_overlap` carried
//! between neighbours. Separators are kept at the start of the piece that
//! follows them. All lengths are in characters.

use std::collections::VecDeque;

/// Default separator ladder, coarsest first. `"。"` covers CJK sentence ends.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", "。", ".", " ", ""];

pub struct RecursiveSplitter<'a> {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'a [&'a str],
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl RecursiveSplitter<'static> {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS,
        }
    }
}

impl<'a> RecursiveSplitter<'a> {
    pub fn with_separators(chunk_size: usize, chunk_overlap: usize, separators: &'a [&'a str]) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators,
        }
    }

    /// Non-empty, trimmed pieces of at most `chunk_size` characters, except
    /// where no separator can break a piece further.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, self.separators)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = *sep;
                break;
            }
            if text.contains(sep) {
                separator = *sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut output = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                output.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    output.push(trimmed.to_string());
                }
            } else {
                output.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            output.extend(self.merge(&pending));
        }

        output
    }

    /// Greedy merge of small pieces with overlap.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut docs, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_joined(&mut docs, &window);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Splits before every occurrence of `sep`; an empty separator splits into
/// single characters. Empty pieces are dropped.
fn split_keep_start<'t>(text: &'t str, sep: &str) -> Vec<&'t str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
