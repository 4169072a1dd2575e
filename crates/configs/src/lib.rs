//! crates/configs/src/lib.rs
//!
//! Layered settings: built-in defaults, then `config/default.toml` and
//! `config/local.toml` if present, then `.env`, then `BBS__SECTION__KEY`
//! environment variables. Every field has a default, so the server boots
//! with nothing configured.

use std::path::Path;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::warn;

pub const ENV_PREFIX: &str = "BBS";

const DEV_JWT_SECRET: &str = "modern-bbs-development-secret";
const MIB: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub content: ContentSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-delimited origins for CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: String::new(),
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn origins(&self) -> Vec<String> {
        split_list(&self.allowed_origins)
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LimitSettings {
    pub limit: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_global_limit")]
    pub global: LimitSettings,
    #[serde(default = "default_post_limit")]
    pub post: LimitSettings,
    #[serde(default = "default_auth_limit")]
    pub auth: LimitSettings,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: default_global_limit(),
            post: default_post_limit(),
            auth: default_auth_limit(),
        }
    }
}

fn default_global_limit() -> LimitSettings {
    LimitSettings {
        limit: 100,
        window_ms: 15 * 60 * 1000,
    }
}

fn default_post_limit() -> LimitSettings {
    LimitSettings {
        limit: 50,
        window_ms: 15 * 60 * 1000,
    }
}

fn default_auth_limit() -> LimitSettings {
    LimitSettings {
        limit: 10,
        window_ms: 60 * 60 * 1000,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentSettings {
    /// Comma-delimited.
    #[serde(default = "default_ng_words")]
    pub ng_words: String,
    #[serde(default = "default_name")]
    pub default_name: String,
    #[serde(default = "default_title_min")]
    pub title_min: usize,
    #[serde(default = "default_title_max")]
    pub title_max: usize,
    #[serde(default = "default_name_max")]
    pub name_max: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            ng_words: default_ng_words(),
            default_name: default_name(),
            title_min: default_title_min(),
            title_max: default_title_max(),
            name_max: default_name_max(),
        }
    }
}

fn default_ng_words() -> String {
    "爆発,殺人,ころしてやる".into()
}

fn default_name() -> String {
    "名無しさん".into()
}

fn default_title_min() -> usize {
    3
}

fn default_title_max() -> usize {
    100
}

fn default_name_max() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_data_uri_max")]
    pub data_uri_max_bytes: usize,
    #[serde(default = "default_multipart_max")]
    pub multipart_max_bytes: usize,
    /// Comma-delimited MIME types.
    #[serde(default = "default_mime_types")]
    pub allowed_mime_types: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            data_uri_max_bytes: default_data_uri_max(),
            multipart_max_bytes: default_multipart_max(),
            allowed_mime_types: default_mime_types(),
            upload_dir: default_upload_dir(),
            url_prefix: default_url_prefix(),
        }
    }
}

fn default_data_uri_max() -> usize {
    15 * MIB
}

fn default_multipart_max() -> usize {
    10 * MIB
}

fn default_mime_types() -> String {
    "image/jpeg,image/png,image/gif,image/webp".into()
}

fn default_upload_dir() -> String {
    "./uploads".into()
}

fn default_url_prefix() -> String {
    "/uploads".into()
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_jwt_secret", deserialize_with = "secret")]
    pub jwt_secret: SecretString,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

fn default_jwt_secret() -> SecretString {
    SecretString::from(DEV_JWT_SECRET.to_owned())
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub format: LogFormat,
}

/// Splits a comma-delimited value, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Settings {
    /// Loads from `./config`, `.env` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                warn!(%err, "ignoring unreadable .env file");
            }
        }
        Self::load_from(Path::new("config"))
    }

    /// Loads with `dir/default.toml` and `dir/local.toml` as optional file
    /// layers. Does not read `.env`.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&dir.join("local").to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }

    /// Call once logging is up.
    pub fn warn_on_insecure_defaults(&self) {
        use secrecy::ExposeSecret;
        if self.auth.jwt_secret.expose_secret() == DEV_JWT_SECRET {
            warn!("auth.jwt_secret is not set, using the development secret");
        }
    }
}
