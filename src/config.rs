use std::env;
use std::path::PathBuf;

pub const DEFAULT_SECRET_KEY: &str = "change-me-for-prod";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://database/datachat.db";
pub const DEFAULT_AI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// AI fallback questions allowed per user per calendar month
pub const AI_MONTHLY_QUOTA: i64 = 10;

/// Rows of the active dataset sent along with an AI question
pub const AI_SAMPLE_ROWS: usize = 5;

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret used to sign session cookies
    pub secret_key: String,

    /// Enables the AI fallback when set
    pub openai_api_key: Option<String>,

    pub ai_api_base: String,
    pub ai_model: String,
    pub ai_monthly_quota: i64,

    pub database_url: String,
    pub upload_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read the configuration from environment variables, falling back to
    /// defaults for anything unset
    ///
    /// # Environment
    /// * `SECRET_KEY` - cookie signing secret
    /// * `OPENAI_API_KEY` - enables the AI fallback
    /// * `AI_API_BASE`, `AI_MODEL` - completion service endpoint and model
    /// * `DATABASE_URL` - SQLite connection URL
    /// * `UPLOAD_DIR`, `CACHE_DIR` - data file and session cache directories
    /// * `BIND_ADDR` - listen address
    /// * `MAX_UPLOAD_BYTES` - request body limit for uploads
    pub fn from_env() -> Self {
        let secret_key = env::var("SECRET_KEY").unwrap_or_else(|_| {
            log::warn!("SECRET_KEY is not set; using the built-in development secret");
            DEFAULT_SECRET_KEY.to_string()
        });

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Ignoring invalid MAX_UPLOAD_BYTES value {:?}", raw);
                DEFAULT_MAX_UPLOAD_BYTES
            }),
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Config {
            secret_key,
            openai_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            ai_api_base: env_or("AI_API_BASE", DEFAULT_AI_API_BASE),
            ai_model: env_or("AI_MODEL", DEFAULT_AI_MODEL),
            ai_monthly_quota: AI_MONTHLY_QUOTA,
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
            cache_dir: PathBuf::from(env_or("CACHE_DIR", "cache")),
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            max_upload_bytes,
        }
    }

    /// Configuration rooted at the given directories with an in-memory
    /// database and the AI fallback disabled
    pub fn for_dirs(upload_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Config {
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            openai_api_key: None,
            ai_api_base: DEFAULT_AI_API_BASE.to_string(),
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_monthly_quota: AI_MONTHLY_QUOTA,
            database_url: "sqlite::memory:".to_string(),
            upload_dir: upload_dir.into(),
            cache_dir: cache_dir.into(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
