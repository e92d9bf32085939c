use crate::services::chunk_store::{DEFAULT_BUCKET, DEFAULT_CHUNK_SIZE};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt::Display, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub bucket: String,
    pub chunk_size: usize,
    pub max_upload_bytes: usize,
    pub download_content_type: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Chunked image upload and download API")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides IMAGE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket files are stored under (overrides IMAGE_STORE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Chunk size in bytes (overrides IMAGE_STORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Largest accepted upload body in bytes (overrides IMAGE_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Send the stored MIME type as Content-Type on downloads
    /// (overrides IMAGE_STORE_DOWNLOAD_CONTENT_TYPE)
    #[arg(long)]
    pub download_content_type: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge `args` over values looked up with `env`, then over defaults.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = env("IMAGE_STORE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&env, "IMAGE_STORE_PORT", 9000u16)?;
        let env_db = env("IMAGE_STORE_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/images.db".into());
        let env_bucket = env("IMAGE_STORE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.into());
        let env_chunk = parse_var(&env, "IMAGE_STORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_max_upload =
            parse_var(&env, "IMAGE_STORE_MAX_UPLOAD_BYTES", 50 * 1024 * 1024usize)?;
        let env_content_type = parse_var(&env, "IMAGE_STORE_DOWNLOAD_CONTENT_TYPE", false)?;

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or(env_bucket),
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            download_content_type: args.download_content_type || env_content_type,
        };

        if cfg.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        if cfg.bucket.is_empty() {
            bail!("bucket name must not be empty");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(env: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}
