use crate::services::disk_store::validate_bucket_name;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{collections::HashSet, env};

/// Where uploaded objects are kept.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// SQLite metadata plus payload files under the storage directory.
    Disk,
    /// Process memory; everything is lost on exit.
    Memory,
}

/// Settings the upload pipeline runs with. Built once and passed in, never read
/// from the environment by the pipeline itself.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub bucket: String,
    pub allowed_usernames: HashSet<String>,
    pub cdn_domain: Option<String>,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub public_endpoint: String,
    pub upload: UploadConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Single-endpoint file upload gateway")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob store backend (overrides UPLOAD_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where objects are stored (overrides UPLOAD_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides UPLOAD_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL this service is reachable under (overrides UPLOAD_GATEWAY_PUBLIC_ENDPOINT)
    #[arg(long)]
    pub public_endpoint: Option<String>,

    /// Bucket uploads are written to (overrides UPLOAD_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = args
            .host
            .or_else(|| lookup("UPLOAD_GATEWAY_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match (args.port, lookup("UPLOAD_GATEWAY_PORT")) {
            (Some(port), _) => port,
            (None, Some(value)) => value
                .parse::<u16>()
                .with_context(|| format!("parsing UPLOAD_GATEWAY_PORT value `{}`", value))?,
            (None, None) => 3000,
        };
        let backend = match (args.backend, lookup("UPLOAD_GATEWAY_BACKEND")) {
            (Some(backend), _) => backend,
            (None, Some(value)) => Backend::from_str(&value, true).map_err(|err| {
                anyhow::anyhow!("parsing UPLOAD_GATEWAY_BACKEND value `{}`: {}", value, err)
            })?,
            (None, None) => Backend::Disk,
        };
        let storage_dir = args
            .storage_dir
            .or_else(|| lookup("UPLOAD_GATEWAY_STORAGE_DIR"))
            .unwrap_or_else(|| "./data/objects".into());
        let database_url = args
            .database_url
            .or_else(|| lookup("UPLOAD_GATEWAY_DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://./data/meta/uploads.db".into());
        let public_endpoint = args
            .public_endpoint
            .or_else(|| lookup("UPLOAD_GATEWAY_PUBLIC_ENDPOINT"))
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let bucket = args
            .bucket
            .or_else(|| lookup("UPLOAD_BUCKET"))
            .unwrap_or_else(|| "uploads".into());
        if let Err(err) = validate_bucket_name(&bucket) {
            bail!("invalid bucket configuration: {}", err);
        }

        let upload = UploadConfig {
            bucket,
            allowed_usernames: parse_allow_list(&lookup("USERNAME_ALLOW_LIST").unwrap_or_default()),
            cdn_domain: lookup("CDN_DOMAIN")
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        };

        Ok(Self {
            host,
            port,
            backend,
            storage_dir,
            database_url,
            public_endpoint,
            upload,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Comma-separated usernames; blanks are ignored, so an unset list admits nobody.
pub fn parse_allow_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
