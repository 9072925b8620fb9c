//! Renders the final text into the requested output format.

use serde::Serialize;

use crate::metadata::Metadata;
use crate::task::OutputFormat;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    content: &'a str,
    metadata: &'a Metadata,
    chunks_count: usize,
}

/// Markdown returns `text` verbatim. Json returns a pretty-printed
/// `{content, metadata, chunksCount}` object; multibyte characters are
/// written as UTF-8, never `\u` escaped.
pub fn render(
    format: OutputFormat,
    text: &str,
    metadata: &Metadata,
    chunks_count: usize,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Markdown => Ok(text.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(&Envelope {
            content: text,
            metadata,
            chunks_count,
        }),
    }
}
