use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

const MIN_PORT: u16 = 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Filesystem-backed object storage service")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to, 1024-65535 (overrides OBJECT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding buckets and registries (overrides OBJECT_STORE_STORAGE_DIR)
    #[arg(long = "dir", alias = "storage-dir")]
    pub storage_dir: Option<String>,

    /// Repair registries against the storage directory and exit
    #[arg(long)]
    pub reconcile: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and reconcile flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let reconcile = args.reconcile;
        Ok((Self::merge(args, |name| env::var(name))?, reconcile))
    }

    /// Merge CLI args over environment values over defaults.
    fn merge<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = var("OBJECT_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match var("OBJECT_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing OBJECT_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 8080,
            Err(err) => return Err(err).context("reading OBJECT_STORE_PORT"),
        };
        let env_storage = var("OBJECT_STORE_STORAGE_DIR").unwrap_or_else(|_| "data".into());

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
        };

        if cfg.port < MIN_PORT {
            bail!("invalid port number {}: must be between 1024 and 65535", cfg.port);
        }
        if cfg.storage_dir.trim().is_empty() {
            bail!("storage directory not provided");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
