//! Configuration module

pub mod settings;

pub use settings::{
    AuthConfig, DatabaseConfig, GenerationConfig, GeneratorConfig, LikeConsistency, LikesConfig,
    LoggingConfig, RateLimitConfig, ServerConfig, SessionConfig, Settings, StorageConfig,
    StorageProvider,
};
