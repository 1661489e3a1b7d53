//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub database: DatabaseConfig,
    pub generator: GeneratorConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub likes: LikesConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    180
}

/// A session token issued by the identity provider, mapped to its user
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub token: String,
    pub user_id: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
    /// Header carrying an already-verified user id, set by an identity-aware proxy
    #[serde(default)]
    pub trusted_header: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Per-user generation rate limiting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_per_minute")]
    pub generations_per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_per_minute() -> u32 {
    5
}

fn default_burst() -> u32 {
    5
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_database_url() -> String {
    "sqlite://emoji-gallery.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Image-generation provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_model_version")]
    pub model_version: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_generator_timeout")]
    pub timeout_ms: u64,
}

fn default_generator_url() -> String {
    "https://api.replicate.com".to_string()
}

fn default_model_version() -> String {
    "dee76b5afde21b0f01ed7925f0665b7e879c50ee718c5f78a9d38e04d523cc5e".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_generator_timeout() -> u64 {
    120_000
}

/// Prompt submission limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

fn default_max_prompt_chars() -> usize {
    500
}

/// Which object store receives generated images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Supabase,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_provider")]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_storage_path")]
    pub base_path: String,
    #[serde(default = "default_url_prefix")]
    pub public_url_prefix: String,
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_service_key: String,
    #[serde(default = "default_storage_timeout")]
    pub timeout_ms: u64,
}

fn default_storage_provider() -> StorageProvider {
    StorageProvider::Local
}

fn default_bucket() -> String {
    "emojis".to_string()
}

fn default_storage_path() -> String {
    "./generated_images".to_string()
}

fn default_url_prefix() -> String {
    "http://localhost:8080/images".to_string()
}

fn default_storage_timeout() -> u64 {
    30_000
}

/// How a like toggle keeps the counter and the like rows in step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeConsistency {
    /// Two independent writes; double-likes are absorbed, phantom unlikes still decrement
    Legacy,
    /// Row mutation and counter mutation in one transaction
    Atomic,
}

/// Like toggle configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LikesConfig {
    #[serde(default = "default_consistency")]
    pub consistency: LikeConsistency,
}

fn default_consistency() -> LikeConsistency {
    LikeConsistency::Legacy
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("server.request_timeout_secs", default_request_timeout())?
            .set_default("server.cors_permissive", true)?
            .set_default("auth.sessions", Vec::<String>::new())?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.generations_per_minute", default_per_minute())?
            .set_default("rate_limit.burst_size", default_burst())?
            .set_default("database.url", default_database_url())?
            .set_default("database.max_connections", default_max_connections())?
            .set_default("database.run_migrations", true)?
            .set_default("generator.base_url", default_generator_url())?
            .set_default("generator.api_token", "")?
            .set_default("generator.model_version", default_model_version())?
            .set_default("generator.poll_interval_ms", default_poll_interval())?
            .set_default("generator.timeout_ms", default_generator_timeout())?
            .set_default("generation.max_prompt_chars", default_max_prompt_chars() as u64)?
            .set_default("storage.provider", "local")?
            .set_default("storage.bucket", default_bucket())?
            .set_default("storage.base_path", default_storage_path())?
            .set_default("storage.public_url_prefix", default_url_prefix())?
            .set_default("storage.timeout_ms", default_storage_timeout())?
            .set_default("likes.consistency", "legacy")?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables, e.g. EMOJI_GALLERY__SERVER__PORT=9000
            .add_source(
                Environment::with_prefix("EMOJI_GALLERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.generator.api_token.is_empty() {
            return Err(invalid("generator.api_token must be set"));
        }

        if self.generator.poll_interval_ms == 0 {
            return Err(invalid("generator.poll_interval_ms must be positive"));
        }

        if self.generation.max_prompt_chars == 0 {
            return Err(invalid("generation.max_prompt_chars must be positive"));
        }

        if self.storage.bucket.is_empty() || self.storage.bucket.contains('/') {
            return Err(invalid(format!(
                "storage.bucket '{}' must be a single non-empty path segment",
                self.storage.bucket
            )));
        }

        if self.storage.provider == StorageProvider::Supabase
            && (self.storage.supabase_url.is_empty() || self.storage.supabase_service_key.is_empty())
        {
            return Err(invalid(
                "storage.supabase_url and storage.supabase_service_key are required for the supabase provider",
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.generations_per_minute == 0 {
            return Err(invalid("rate_limit.generations_per_minute must be positive"));
        }

        for session in &self.auth.sessions {
            if session.token.is_empty() || session.user_id.is_empty() {
                return Err(invalid("auth.sessions entries need both token and user_id"));
            }
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "logging.format '{}' must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                cors_permissive: true,
            },
            auth: AuthConfig {
                sessions: vec![],
                trusted_header: None,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                generations_per_minute: default_per_minute(),
                burst_size: default_burst(),
            },
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: default_max_connections(),
                run_migrations: true,
            },
            generator: GeneratorConfig {
                base_url: default_generator_url(),
                api_token: String::new(),
                model_version: default_model_version(),
                poll_interval_ms: default_poll_interval(),
                timeout_ms: default_generator_timeout(),
            },
            generation: GenerationConfig {
                max_prompt_chars: default_max_prompt_chars(),
            },
            storage: StorageConfig {
                provider: default_storage_provider(),
                bucket: default_bucket(),
                base_path: default_storage_path(),
                public_url_prefix: default_url_prefix(),
                supabase_url: String::new(),
                supabase_service_key: String::new(),
                timeout_ms: default_storage_timeout(),
            },
            likes: LikesConfig {
                consistency: default_consistency(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
