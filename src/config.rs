use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

use crate::services::{
    analysis::{DEFAULT_BASE_URL, DEFAULT_MODEL},
    upload_service::{DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_MAX_UPLOAD_BYTES},
};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL clients (and the content fetcher) reach this service on.
    pub public_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub analysis_timeout: Duration,
    pub max_upload_bytes: usize,
    pub jwt_secret: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Study assistant upload and analysis API")]
pub struct Args {
    /// Host to bind to (overrides STUDY_BUDDY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STUDY_BUDDY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides STUDY_BUDDY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for blob metadata (overrides STUDY_BUDDY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL used in returned blob URLs (overrides STUDY_BUDDY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Generative model name (overrides GEMINI_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Seconds to wait for image analysis during upload (overrides STUDY_BUDDY_ANALYSIS_TIMEOUT_SECS)
    #[arg(long)]
    pub analysis_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |key| env::var(key))?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values looked up through `var`, then defaults.
    fn merge<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let text = |key: &str| -> Result<Option<String>> {
            match var(key) {
                Ok(value) if value.trim().is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        let host = args
            .host
            .or(text("STUDY_BUDDY_HOST")?)
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => parse_var(&text, "STUDY_BUDDY_PORT")?.unwrap_or(5000),
        };
        let storage_dir = args
            .storage_dir
            .or(text("STUDY_BUDDY_STORAGE_DIR")?)
            .unwrap_or_else(|| "./data/blobs".into());
        let database_url = args
            .database_url
            .or(text("STUDY_BUDDY_DATABASE_URL")?)
            .unwrap_or_else(|| "sqlite://./data/meta/study_buddy.db".into());
        let public_url = args
            .public_url
            .or(text("STUDY_BUDDY_PUBLIC_URL")?)
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
        let gemini_model = args
            .model
            .or(text("GEMINI_MODEL")?)
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        let gemini_base_url = text("GEMINI_BASE_URL")?.unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let analysis_timeout = match args.analysis_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => parse_var(&text, "STUDY_BUDDY_ANALYSIS_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ANALYSIS_TIMEOUT),
        };
        let max_upload_bytes = parse_var(&text, "STUDY_BUDDY_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let jwt_secret = text("JWT_SECRET")?.context("JWT_SECRET must be set")?;

        if analysis_timeout.is_zero() {
            anyhow::bail!("analysis timeout must be at least one second");
        }

        Ok(Self {
            host,
            port,
            storage_dir,
            database_url,
            public_url,
            gemini_api_key: text("GEMINI_API_KEY")?,
            gemini_model,
            gemini_base_url,
            analysis_timeout,
            max_upload_bytes,
            jwt_secret,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, F>(text: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Result<Option<String>>,
{
    text(key)?
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_url", &self.public_url)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("analysis_timeout", &self.analysis_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = AppConfig::merge(Args::default(), lookup(&[("JWT_SECRET", "s")])).unwrap();

        assert_eq!(cfg.addr(), "0.0.0.0:5000");
        assert_eq!(cfg.public_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.gemini_model, DEFAULT_MODEL);
        assert_eq!(cfg.analysis_timeout, Duration::from_secs(45));
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
        assert!(cfg.gemini_api_key.is_none());
    }

    #[test]
    fn cli_overrides_environment() {
        let args = Args {
            port: Some(8080),
            analysis_timeout_secs: Some(5),
            ..Args::default()
        };
        let env = lookup(&[
            ("JWT_SECRET", "s"),
            ("STUDY_BUDDY_PORT", "9000"),
            ("STUDY_BUDDY_ANALYSIS_TIMEOUT_SECS", "60"),
            ("GEMINI_API_KEY", "key"),
        ]);

        let cfg = AppConfig::merge(args, env).unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.analysis_timeout, Duration::from_secs(5));
        assert_eq!(cfg.gemini_api_key.as_deref(), Some("key"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let env = lookup(&[("JWT_SECRET", "s"), ("STUDY_BUDDY_PORT", "eighty")]);
        let err = AppConfig::merge(Args::default(), env).unwrap_err();
        assert!(format!("{:#}", err).contains("STUDY_BUDDY_PORT"));
    }

    #[test]
    fn missing_jwt_secret_is_an_error() {
        assert!(AppConfig::merge(Args::default(), lookup(&[])).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let env = lookup(&[("JWT_SECRET", "hunter2"), ("GEMINI_API_KEY", "AIza-secret")]);
        let cfg = AppConfig::merge(Args::default(), env).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("AIza-secret"));
    }
}
