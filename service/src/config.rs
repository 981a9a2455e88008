use crate::client::signing::Credentials;
use crate::client::ObjectStoreConfig;
use crate::domain::cache_policy::Environment;
use crate::observability::LogFormat;
use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line + environment configuration. Every flag falls back to its
/// environment variable, then to the default.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Image proxy serving R2 objects with local fallback")]
pub struct AppConfig {
    #[arg(long, env = "IMAGE_PROXY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "IMAGE_PROXY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// `development` and `test` switch every image to non-caching headers.
    #[arg(long, env = "APP_ENV", default_value = "production")]
    pub app_env: Environment,

    /// Root of the local fallback images.
    #[arg(long, env = "IMAGE_STATIC_DIR", default_value = "./public/images")]
    pub static_dir: PathBuf,

    /// Route the proxy is mounted under, stripped before path validation.
    #[arg(long, env = "IMAGE_ROUTE_PREFIX", default_value = "/images/")]
    pub route_prefix: String,

    #[arg(long, env = "R2_ACCOUNT_ID")]
    pub r2_account_id: Option<String>,

    /// Overrides the endpoint derived from the account id.
    #[arg(long, env = "R2_ENDPOINT")]
    pub r2_endpoint: Option<String>,

    #[arg(long, env = "R2_ACCESS_KEY_ID")]
    pub r2_access_key_id: Option<String>,

    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub r2_secret_access_key: Option<String>,

    #[arg(long, env = "R2_BUCKET_NAME")]
    pub r2_bucket_name: Option<String>,

    #[arg(long, env = "R2_PUBLIC_URL")]
    pub r2_public_url: Option<String>,

    #[arg(long, env = "USE_R2_IMAGES", default_value_t = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub use_r2: bool,

    #[arg(long, env = "FALLBACK_TO_LOCAL", default_value_t = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub fallback_to_local: bool,

    #[arg(long, env = "IMAGE_CACHE_ENABLED", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub cache_enabled: bool,

    #[arg(long, env = "IMAGE_CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = "IMAGE_CACHE_MAX_ENTRIES", default_value_t = 256)]
    pub cache_max_entries: usize,

    /// Upper bound on the summed size of cached images. Larger images are not cached.
    #[arg(long, env = "IMAGE_CACHE_MAX_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub cache_max_bytes: usize,

    /// Origins that receive CORS headers, comma separated.
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_value = "http://localhost:3000")]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "R2_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Print finished spans to stdout.
    #[arg(long, env = "TRACE_STDOUT", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub trace_stdout: bool,
}

impl AppConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse::<SocketAddr>()
            .with_context(|| format!("parsing listen address `{raw}`"))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `None` when R2 is switched off or nothing to reach it with is configured.
    pub fn object_store(&self) -> Option<ObjectStoreConfig> {
        if !self.use_r2 {
            return None;
        }

        let endpoint = self
            .r2_endpoint
            .clone()
            .or_else(|| self.r2_account_id.as_deref().map(ObjectStoreConfig::r2_endpoint));
        let credentials = match (&self.r2_access_key_id, &self.r2_secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            }),
            _ => None,
        };

        let signed = endpoint.is_some() && credentials.is_some() && self.r2_bucket_name.is_some();
        if !signed && self.r2_public_url.is_none() {
            return None;
        }

        Some(ObjectStoreConfig {
            endpoint,
            bucket: self.r2_bucket_name.clone(),
            credentials,
            public_url: self.r2_public_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}
