//! HTTP surface: the upload form and the `/upload` orchestrator.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info};

use crate::error::CaptionError;
use crate::metadata::parse_metadata_file;
use crate::model::CaptionOrigin;
use crate::{persist, AppState};

const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const ALLOWED_TEXT_EXTENSIONS: &[&str] = &["txt"];

const INVALID_FILES_MESSAGE: &str = "Invalid files! Please upload a valid image and .txt file.";

pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.upload_dir);
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .nest_service("/static/uploads", uploads)
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn allowed_file(filename: &str, extensions: &[&str]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to its final component, dropping any
/// directory parts.
fn base_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Accept an `image` + `metadata` multipart upload, run the caption
/// pipeline, persist the JSON record, and render a confirmation page.
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Html<String>, CaptionError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut metadata: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CaptionError::InputValidation(format!("malformed upload: {e}")))?
    {
        let name = field.name().map(str::to_string);
        let filename = field.file_name().map(base_name);
        let data = field
            .bytes()
            .await
            .map_err(|e| CaptionError::InputValidation(format!("malformed upload: {e}")))?;
        match (name.as_deref(), filename) {
            (Some("image"), Some(filename)) => image = Some((filename, data.to_vec())),
            (Some("metadata"), Some(filename)) => metadata = Some((filename, data.to_vec())),
            _ => {}
        }
    }

    let (Some((image_filename, image_bytes)), Some((metadata_filename, metadata_bytes))) =
        (image, metadata)
    else {
        return Err(CaptionError::InputValidation(INVALID_FILES_MESSAGE.into()));
    };
    if !allowed_file(&image_filename, ALLOWED_IMAGE_EXTENSIONS)
        || !allowed_file(&metadata_filename, ALLOWED_TEXT_EXTENSIONS)
    {
        return Err(CaptionError::InputValidation(INVALID_FILES_MESSAGE.into()));
    }

    let image_path = state.config.upload_dir.join(&image_filename);
    let metadata_path = state.config.upload_dir.join(&metadata_filename);
    tokio::fs::write(&image_path, &image_bytes).await?;
    tokio::fs::write(&metadata_path, &metadata_bytes).await?;
    // Library copy of the processed image.
    tokio::fs::write(state.config.image_dir.join(&image_filename), &image_bytes).await?;

    let record = parse_metadata_file(&metadata_path)?;
    let context = record.context_string();

    let outcome = state.model.generate_captions(&image_path, &context).await;
    match &outcome.origin {
        CaptionOrigin::Inference => info!("captions generated for {image_filename}"),
        CaptionOrigin::Fallback(reason) => {
            info!("fallback captions served for {image_filename} ({reason:?})")
        }
    }

    // A failed artifact write is logged but does not fail the request; the
    // caller still gets their captions.
    if let Err(err) = persist::write_record(&state.config.output_dir, &image_filename, &outcome.captions)
    {
        error!("{err}");
    }

    let captions = &outcome.captions;
    Ok(Html(format!(
        r#"
        <h3>Upload Successful!</h3>
        <img src='/static/uploads/{image}' width='300'><br><br>
        <b style='color: blue;'>Concise Caption:</b> {concise}<br>
        <b style='color: red;'>Detailed Caption:</b> {detailed}<br>
        <b>Confidence Scores:</b> concise: {c_conf:.2}, detailed: {d_conf:.2}<br><br>
        <a href="/">Go Back</a>
        "#,
        image = escape_html(&image_filename),
        concise = escape_html(&captions.concise),
        detailed = escape_html(&captions.detailed),
        c_conf = captions.confidence_scores.concise,
        d_conf = captions.confidence_scores.detailed,
    )))
}

async fn index() -> Html<&'static str> {
    Html(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Figure Captioner</title>
    <style>
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            padding: 20px;
        }

        .container {
            background: white;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            max-width: 600px;
            width: 100%;
            padding: 40px;
        }

        h1 {
            color: #333;
            margin-bottom: 10px;
            font-size: 2em;
        }

        .subtitle {
            color: #666;
            margin-bottom: 30px;
            font-size: 0.9em;
        }

        .field {
            margin-bottom: 20px;
        }

        .field label {
            display: block;
            color: #667eea;
            font-weight: 600;
            margin-bottom: 8px;
        }

        .field .hint {
            color: #999;
            font-size: 0.85em;
            margin-top: 5px;
        }

        input[type="file"] {
            width: 100%;
            padding: 12px;
            border: 2px dashed #667eea;
            border-radius: 10px;
            background: #f8f9ff;
            cursor: pointer;
        }

        button {
            width: 100%;
            padding: 14px;
            border: none;
            border-radius: 10px;
            background: #667eea;
            color: white;
            font-size: 1.1em;
            font-weight: 600;
            cursor: pointer;
            transition: background 0.3s;
        }

        button:hover {
            background: #764ba2;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>🖼️ Figure Captioner</h1>
        <p class="subtitle">Upload a document figure and its metadata to generate concise and detailed captions</p>

        <form action="/upload" method="post" enctype="multipart/form-data">
            <div class="field">
                <label for="image">Figure image</label>
                <input type="file" id="image" name="image" accept=".png,.jpg,.jpeg" required>
                <div class="hint">PNG, JPG or JPEG</div>
            </div>
            <div class="field">
                <label for="metadata">Metadata file</label>
                <input type="file" id="metadata" name="metadata" accept=".txt" required>
                <div class="hint">.txt with section_header, above_text, caption, below_text, footnote</div>
            </div>
            <button type="submit">Generate Captions</button>
        </form>
    </div>
</body>
</html>
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_file_checks_extension_case_insensitively() {
        assert!(allowed_file("photo.PNG", ALLOWED_IMAGE_EXTENSIONS));
        assert!(allowed_file("photo.jpeg", ALLOWED_IMAGE_EXTENSIONS));
        assert!(!allowed_file("photo.gif", ALLOWED_IMAGE_EXTENSIONS));
        assert!(!allowed_file("photo", ALLOWED_IMAGE_EXTENSIONS));
        assert!(allowed_file("meta.txt", ALLOWED_TEXT_EXTENSIONS));
        assert!(!allowed_file("meta.md", ALLOWED_TEXT_EXTENSIONS));
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("../../etc/passwd.png"), "passwd.png");
        assert_eq!(base_name("dogs.jpg"), "dogs.jpg");
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<b>"cats" & dogs</b>"#),
            "&lt;b&gt;&quot;cats&quot; &amp; dogs&lt;/b&gt;"
        );
    }
}
