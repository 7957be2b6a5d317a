//! Caption model adapter.
//!
//! Owns the lifecycle of the remote vision-language model: loaded once at
//! startup into a Ready or Degraded state, then invoked per request. Every
//! invocation path funnels into a [`CaptionOutcome`] — callers never see an
//! error from [`CaptionModel::generate_captions`], only a possibly-fallback
//! caption pair. Availability is deliberately favored over error
//! visibility here.

use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AppConfig, MAX_OUTPUT_TOKENS};
use crate::error::CaptionError;
use crate::fallback;

/// Minimum width/height accepted by the preprocessor, in pixels. Smaller
/// inputs produce degenerate model output, so they are rejected early with
/// a clear diagnostic instead.
pub const MIN_DIMENSION: u32 = 100;

/// Detailed-caption marker used when the model output has no recognizable
/// two-part structure.
pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfidenceScores {
    pub concise: f64,
    pub detailed: f64,
}

/// The caption pair produced for one image, genuine or fallback. Always
/// fully populated.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaptionResult {
    pub concise: String,
    pub detailed: String,
    pub confidence_scores: ConfidenceScores,
}

/// Why a fallback result was substituted for genuine inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The model never loaded; the adapter is permanently Degraded.
    ModelUnavailable,
    /// This particular invocation failed (preprocessing or generation).
    InvocationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionOrigin {
    Inference,
    Fallback(FallbackReason),
}

/// A [`CaptionResult`] tagged with where it came from, so the orchestrator
/// can tell a genuine caption from the placeholder without parsing logs.
#[derive(Debug, Clone)]
pub struct CaptionOutcome {
    pub captions: CaptionResult,
    pub origin: CaptionOrigin,
}

impl CaptionOutcome {
    fn fallback(reason: FallbackReason) -> Self {
        Self {
            captions: fallback::fallback_result(),
            origin: CaptionOrigin::Fallback(reason),
        }
    }
}

/// Connection to the remote generateContent endpoint.
struct RemoteVlm {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

enum ModelState {
    Ready(RemoteVlm),
    /// Load failed; every call delegates to the fallback provider for the
    /// rest of the process's life. No reload is attempted.
    Degraded,
}

pub struct CaptionModel {
    state: ModelState,
}

impl CaptionModel {
    /// One-time load at process start. A missing API key puts the adapter
    /// into the permanent Degraded state rather than failing startup.
    pub fn load(config: &AppConfig) -> Self {
        match &config.api_key {
            Some(key) => {
                info!("caption model ready (endpoint: {})", config.model_endpoint);
                Self {
                    state: ModelState::Ready(RemoteVlm {
                        client: reqwest::Client::new(),
                        endpoint: config.model_endpoint.clone(),
                        api_key: key.clone(),
                    }),
                }
            }
            None => {
                let err = CaptionError::ModelLoad("GEMINI_API_KEY is not set".into());
                warn!("{err}; serving fallback captions only");
                Self::degraded()
            }
        }
    }

    pub fn degraded() -> Self {
        Self {
            state: ModelState::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state, ModelState::Degraded)
    }

    /// Generate a concise/detailed caption pair for the image at
    /// `image_path`, grounded in `context`. Infallible: any preprocessing
    /// or invocation error is logged and replaced with the fallback result.
    pub async fn generate_captions(&self, image_path: &Path, context: &str) -> CaptionOutcome {
        let vlm = match &self.state {
            ModelState::Ready(vlm) => vlm,
            ModelState::Degraded => {
                return CaptionOutcome::fallback(FallbackReason::ModelUnavailable);
            }
        };

        info!("generating captions for {}", image_path.display());
        match run_inference(vlm, image_path, context).await {
            Ok(captions) => CaptionOutcome {
                captions,
                origin: CaptionOrigin::Inference,
            },
            Err(err) => {
                warn!("caption generation failed, using fallback: {err}");
                CaptionOutcome::fallback(FallbackReason::InvocationFailed)
            }
        }
    }
}

async fn run_inference(
    vlm: &RemoteVlm,
    image_path: &Path,
    context: &str,
) -> Result<CaptionResult, CaptionError> {
    let image = preprocess_image(image_path)?;
    let prompt = build_prompt(context);
    let raw = vlm.infer(&image, &prompt).await?;
    let (concise, detailed) = parse_raw_caption(&raw);
    let mut rng = rand::thread_rng();
    Ok(CaptionResult {
        concise,
        detailed,
        confidence_scores: ConfidenceScores {
            concise: confidence_score(&mut rng),
            detailed: confidence_score(&mut rng),
        },
    })
}

/// Decode the image, normalize to 3-channel RGB, and enforce the minimum
/// resolution.
pub fn preprocess_image(path: &Path) -> Result<RgbImage, CaptionError> {
    let image = image::open(path)
        .map_err(|e| CaptionError::ImagePreprocessing(format!("cannot decode image: {e}")))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(CaptionError::ImagePreprocessing(format!(
            "image resolution too low: {width}x{height}, minimum is {MIN_DIMENSION}x{MIN_DIMENSION}"
        )));
    }
    Ok(image)
}

/// The two-part instruction prompt. The parser below depends on the model
/// echoing a recognizable "detailed" delimiter, so the prompt must keep
/// asking for that structure.
fn build_prompt(context: &str) -> String {
    format!(
        "Generate two captions for this image using the following context:\n{context}\nFirst, a concise summary. Then a detailed description."
    )
}

/// Split raw model output into (concise, detailed).
///
/// Searches case-insensitively for the literal token "detailed" and splits
/// at its first occurrence; the concise half is scrubbed of the literal
/// substrings "concise" and "summary". Without the token the whole output
/// becomes the concise caption and the detailed caption is [`NOT_APPLICABLE`].
/// This is a fragile keyword heuristic, kept on purpose: the prompt/output
/// contract has no machine-parseable delimiter.
pub fn parse_raw_caption(raw: &str) -> (String, String) {
    match find_ascii_ci(raw, "detailed") {
        Some(pos) => {
            let before = &raw[..pos];
            let after = &raw[pos + "detailed".len()..];
            let concise = before.replace("concise", "").replace("summary", "");
            (trim_edges(&concise), trim_edges(after))
        }
        None => (raw.trim().to_string(), NOT_APPLICABLE.to_string()),
    }
}

/// Byte position of the first ASCII-case-insensitive occurrence of `token`.
fn find_ascii_ci(haystack: &str, token: &str) -> Option<usize> {
    let token = token.as_bytes();
    haystack
        .as_bytes()
        .windows(token.len())
        .position(|window| window.eq_ignore_ascii_case(token))
}

fn trim_edges(s: &str) -> String {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '.' | '-'))
        .to_string()
}

/// Synthesized confidence in [0.70, 1.00], rounded to two decimals. Not
/// model-derived; it only gives the result the shape downstream consumers
/// expect.
fn confidence_score<R: Rng>(rng: &mut R) -> f64 {
    let raw: f64 = rng.gen_range(0.70..=1.00);
    (raw * 100.0).round() / 100.0
}

impl RemoteVlm {
    /// One round trip to the generateContent endpoint: JPEG-encode the
    /// preprocessed image, inline it as base64 next to the prompt, and pull
    /// the first candidate's text out of the response.
    async fn infer(&self, image: &RgbImage, prompt: &str) -> Result<String, CaptionError> {
        let mut jpeg_bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image.clone())
            .write_to(
                &mut Cursor::new(&mut jpeg_bytes),
                image::ImageOutputFormat::Jpeg(85),
            )
            .map_err(|e| CaptionError::ModelInvocation(format!("jpeg encoding failed: {e}")))?;
        let image_base64 = general_purpose::STANDARD.encode(&jpeg_bytes);

        let payload = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": "image/jpeg",
                            "data": image_base64
                        }
                    }
                ]
            }],
            "generationConfig": {
                "maxOutputTokens": MAX_OUTPUT_TOKENS
            }
        });

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CaptionError::ModelInvocation(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CaptionError::ModelInvocation(e.to_string()))?;
        if !status.is_success() {
            return Err(CaptionError::ModelInvocation(format!(
                "model endpoint returned {status}: {body}"
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| CaptionError::ModelInvocation(format!("unparsable response: {e}")))?;
        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CaptionError::ModelInvocation("no caption text in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::fallback_result;

    fn ready_model(endpoint: &str) -> CaptionModel {
        CaptionModel::load(&AppConfig {
            bind_addr: "127.0.0.1:0".into(),
            upload_dir: "up".into(),
            image_dir: "img".into(),
            output_dir: "out".into(),
            model_endpoint: endpoint.into(),
            api_key: Some("test-key".into()),
        })
    }

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    #[test]
    fn parse_splits_on_detailed_token() {
        let raw = "concise summary: a cat. Detailed: a tabby cat on a windowsill.";
        let (concise, detailed) = parse_raw_caption(raw);
        assert_eq!(concise, "a cat");
        assert_eq!(detailed, "a tabby cat on a windowsill");
    }

    #[test]
    fn parse_split_is_case_insensitive() {
        let (concise, detailed) = parse_raw_caption("a dog. DETAILED - a brown dog running.");
        assert_eq!(concise, "a dog");
        assert_eq!(detailed, "a brown dog running");
    }

    #[test]
    fn parse_splits_at_first_occurrence_only() {
        let (concise, detailed) = parse_raw_caption("x detailed y detailed z");
        assert_eq!(concise, "x");
        assert_eq!(detailed, "y detailed z");
    }

    #[test]
    fn parse_scrubs_concise_and_summary_literals() {
        let (concise, _) = parse_raw_caption("concise summary: puppies detailed: more");
        assert_eq!(concise, "puppies");
    }

    #[test]
    fn parse_without_token_marks_detailed_not_applicable() {
        let (concise, detailed) = parse_raw_caption("  just one caption \n");
        assert_eq!(concise, "just one caption");
        assert_eq!(detailed, NOT_APPLICABLE);
    }

    #[test]
    fn parse_handles_non_ascii_text_before_token() {
        let (concise, detailed) = parse_raw_caption("café scene. Detailed: a café at dusk.");
        assert_eq!(concise, "café scene");
        assert_eq!(detailed, "a café at dusk");
    }

    #[test]
    fn confidence_scores_stay_in_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let score = confidence_score(&mut rng);
            assert!((0.70..=1.00).contains(&score), "out of range: {score}");
            let cents = score * 100.0;
            assert!((cents - cents.round()).abs() < 1e-9, "not 2dp: {score}");
        }
    }

    #[test]
    fn preprocess_rejects_low_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_image(tmp.path(), "small.png", 99, 200);
        let err = preprocess_image(&path);
        assert!(matches!(err, Err(CaptionError::ImagePreprocessing(_))));
    }

    #[test]
    fn preprocess_accepts_minimum_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_image(tmp.path(), "ok.png", 100, 100);
        let image = preprocess_image(&path).unwrap();
        assert_eq!(image.dimensions(), (100, 100));
    }

    #[test]
    fn preprocess_rejects_undecodable_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("not-an-image.png");
        std::fs::write(&path, b"plain text").unwrap();
        let err = preprocess_image(&path);
        assert!(matches!(err, Err(CaptionError::ImagePreprocessing(_))));
    }

    #[test]
    fn missing_api_key_loads_degraded() {
        let model = CaptionModel::load(&AppConfig {
            bind_addr: "127.0.0.1:0".into(),
            upload_dir: "up".into(),
            image_dir: "img".into(),
            output_dir: "out".into(),
            model_endpoint: "http://127.0.0.1:9".into(),
            api_key: None,
        });
        assert!(model.is_degraded());
    }

    #[tokio::test]
    async fn degraded_model_always_returns_the_fixed_fallback() {
        let model = CaptionModel::degraded();
        for _ in 0..3 {
            let outcome = model
                .generate_captions(Path::new("ignored.png"), "context")
                .await;
            assert_eq!(
                outcome.origin,
                CaptionOrigin::Fallback(FallbackReason::ModelUnavailable)
            );
            assert_eq!(outcome.captions, fallback_result());
        }
    }

    #[tokio::test]
    async fn unreadable_image_falls_back_instead_of_erroring() {
        let model = ready_model("http://127.0.0.1:9");
        let outcome = model
            .generate_captions(Path::new("/nonexistent/figure.png"), "")
            .await;
        assert_eq!(
            outcome.origin,
            CaptionOrigin::Fallback(FallbackReason::InvocationFailed)
        );
        assert_eq!(outcome.captions, fallback_result());
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_instead_of_erroring() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_test_image(tmp.path(), "fig.png", 128, 128);
        // Discard port: the connection is refused immediately.
        let model = ready_model("http://127.0.0.1:9");
        let outcome = model.generate_captions(&path, "some context").await;
        assert_eq!(
            outcome.origin,
            CaptionOrigin::Fallback(FallbackReason::InvocationFailed)
        );
        assert!(!outcome.captions.concise.is_empty());
        assert!(!outcome.captions.detailed.is_empty());
    }
}
