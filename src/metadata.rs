//! Metadata parsing and context assembly.
//!
//! A metadata file is a small line-oriented `key: value` text document
//! describing the figure's surroundings in the source document. The parser
//! is deliberately lenient: unknown keys and missing fields never block
//! captioning, only an unreadable file is an error.

use std::fs;
use std::path::Path;

use crate::error::CaptionError;

/// Textual context surrounding a figure, all fields optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    pub section_header: String,
    pub above_text: String,
    pub caption: String,
    pub below_text: String,
    pub footnote: String,
}

impl MetadataRecord {
    /// Join the fields into the single free-text context string fed to the
    /// model. Order is fixed and fields are not trimmed, so the result is
    /// reproducible for identical input; empty fields contribute only
    /// their separator.
    pub fn context_string(&self) -> String {
        [
            self.section_header.as_str(),
            self.above_text.as_str(),
            self.caption.as_str(),
            self.below_text.as_str(),
            self.footnote.as_str(),
        ]
        .join(" ")
    }
}

/// Read a metadata file into a [`MetadataRecord`].
///
/// Fails only if the file itself cannot be read.
pub fn parse_metadata_file(path: &Path) -> Result<MetadataRecord, CaptionError> {
    let text = fs::read_to_string(path)?;
    Ok(parse_metadata(&text))
}

fn parse_metadata(text: &str) -> MetadataRecord {
    let mut record = MetadataRecord::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "section_header" => record.section_header = value,
            "above_text" => record.above_text = value,
            "caption" => record.caption = value,
            "below_text" => record.below_text = value,
            "footnote" => record.footnote = value,
            _ => {}
        }
    }
    record
}
