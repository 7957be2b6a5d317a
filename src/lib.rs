//! figcap: document-figure captioning service.
//!
//! Pipeline: metadata file -> [`metadata::MetadataRecord`] -> context
//! string -> [`model::CaptionModel`] -> [`model::CaptionResult`] ->
//! persisted JSON record. The HTTP layer in [`routes`] orchestrates one
//! full pass per upload.

pub mod config;
pub mod error;
pub mod fallback;
pub mod metadata;
pub mod model;
pub mod persist;
pub mod routes;

pub use routes::build_router;

/// Shared, read-only application state. The model is loaded once and never
/// reconfigured afterwards, so handlers can share it without locking.
pub struct AppState {
    pub config: config::AppConfig,
    pub model: model::CaptionModel,
}
