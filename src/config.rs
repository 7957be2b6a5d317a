//! Runtime configuration, resolved from environment variables (a `.env`
//! file is honored via dotenvy) with hard-coded defaults.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_MODEL_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";

/// Generation-length ceiling passed to the model; bounds latency and
/// output size.
pub const MAX_OUTPUT_TOKENS: u32 = 150;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Where uploaded image + metadata files are stored (served back
    /// statically for the confirmation page).
    pub upload_dir: PathBuf,
    /// Library copy of every processed image.
    pub image_dir: PathBuf,
    /// Where the per-image `<stem>_captions.json` artifacts land.
    pub output_dir: PathBuf,
    pub model_endpoint: String,
    /// Absent key means the adapter starts Degraded rather than failing.
    pub api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };
        Self {
            bind_addr: var("FIGCAP_BIND_ADDR", "0.0.0.0:3000"),
            upload_dir: var("FIGCAP_UPLOAD_DIR", "static/uploads").into(),
            image_dir: var("FIGCAP_IMAGE_DIR", "img_folder").into(),
            output_dir: var("FIGCAP_OUTPUT_DIR", "output_folder").into(),
            model_endpoint: var("FIGCAP_MODEL_ENDPOINT", DEFAULT_MODEL_ENDPOINT),
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }

    /// Create the upload, image, and output directories if missing.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.image_dir, &self.output_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_directories_creates_all_three() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".into(),
            upload_dir: tmp.path().join("up"),
            image_dir: tmp.path().join("img"),
            output_dir: tmp.path().join("out"),
            model_endpoint: DEFAULT_MODEL_ENDPOINT.into(),
            api_key: None,
        };
        config.ensure_directories().unwrap();
        assert!(config.upload_dir.is_dir());
        assert!(config.image_dir.is_dir());
        assert!(config.output_dir.is_dir());
    }
}
