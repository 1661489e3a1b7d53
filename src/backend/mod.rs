//! Backend module - Image generation provider trait and its HTTP client

pub mod replicate;
pub mod traits;

pub use replicate::ReplicateBackend;
pub use traits::{GenerateRequest, GenerateResponse, ImageBackend};
