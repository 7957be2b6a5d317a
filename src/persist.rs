//! Persistence of caption records.
//!
//! One pretty-printed JSON document per processed image, named after the
//! image's base filename with a `_captions` suffix. Reprocessing the same
//! filename overwrites the previous record; nothing is ever deleted here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CaptionError;
use crate::model::{CaptionResult, ConfidenceScores};

#[derive(Debug, Serialize)]
pub struct PersistedCaptionRecord<'a> {
    pub image: &'a str,
    pub concise_caption: &'a str,
    pub detailed_caption: &'a str,
    pub confidence_scores: &'a ConfidenceScores,
}

/// Path of the JSON artifact for `image_filename` under `output_dir`.
pub fn record_path(output_dir: &Path, image_filename: &str) -> PathBuf {
    let stem = Path::new(image_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_filename.to_string());
    output_dir.join(format!("{stem}_captions.json"))
}

/// Write the caption record for `image_filename`, returning the artifact
/// path.
pub fn write_record(
    output_dir: &Path,
    image_filename: &str,
    captions: &CaptionResult,
) -> Result<PathBuf, CaptionError> {
    let record = PersistedCaptionRecord {
        image: image_filename,
        concise_caption: &captions.concise,
        detailed_caption: &captions.detailed,
        confidence_scores: &captions.confidence_scores,
    };
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| CaptionError::Persistence(std::io::Error::other(e)))?;
    let path = record_path(output_dir, image_filename);
    fs::write(&path, json).map_err(CaptionError::Persistence)?;
    Ok(path)
}
