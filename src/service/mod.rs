//! Request-level operations behind the HTTP handlers

pub mod base64;
pub mod generate;
pub mod likes;

pub use generate::GenerationPipeline;
pub use likes::{toggle_like, LikeAction};
