//! Emoji Gallery
//!
//! Signed-in users submit a prompt; the service asks an image-generation
//! provider for one image, stores it in object storage, records it in SQLite
//! and serves the gallery with like/unlike and download actions.

pub mod api;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod service;
pub mod storage;

pub use error::{AppError, Result};

use std::sync::Arc;

use db::Database;
use service::GenerationPipeline;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub db: Database,
    pub pipeline: GenerationPipeline,
}
