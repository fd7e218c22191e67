use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Page size used when a list request does not send a valid one.
    pub items_per_page: i64,
}

/// One-shot actions requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct StartupActions {
    /// Apply the schema and exit.
    pub migrate: bool,
    /// Seed script to run when the store is empty.
    pub seed: Option<PathBuf>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Redemption code (voucher) service")]
pub struct Args {
    /// Host to bind to (overrides VOUCHER_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VOUCHER_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VOUCHER_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Default page size for listings (overrides VOUCHER_STORE_ITEMS_PER_PAGE)
    #[arg(long)]
    pub items_per_page: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// SQL script executed on first run when no redemption codes exist
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and startup actions.
    pub fn from_env_and_args() -> Result<(Self, StartupActions)> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<(Self, StartupActions)> {
        // --- Environment fallback ---
        let env_host = env::var("VOUCHER_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("VOUCHER_STORE_PORT", 3000u16)?;
        let env_db = env::var("VOUCHER_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/voucher_store.db".into());
        let env_page = env_or("VOUCHER_STORE_ITEMS_PER_PAGE", 10i64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            items_per_page: args.items_per_page.unwrap_or(env_page),
        };

        if cfg.items_per_page < 1 {
            anyhow::bail!("items_per_page must be at least 1, got {}", cfg.items_per_page);
        }

        let actions = StartupActions {
            migrate: args.migrate,
            seed: args.seed,
        };
        Ok((cfg, actions))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse `key`, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
