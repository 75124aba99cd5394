//! Configuration management

use anyhow::{self, Context, Result};

use crate::services::importer::DEFAULT_MAX_FILE_BYTES;

/// Which `GuestStore` implementation stores confirmed guests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!(
                "GUEST_STORE_BACKEND must be 'postgres' or 'memory' (got '{}')",
                other
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Optional NATS credentials, used only when both are set
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,

    /// PostgreSQL connection string (required by the postgres backend)
    pub database_url: Option<String>,

    pub store_backend: StoreBackend,

    /// Uploads above this size are rejected before parsing
    pub max_file_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nats_url = lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let nats_user = lookup("NATS_USER").filter(|u| !u.is_empty());
        let nats_password = lookup("NATS_PASSWORD");

        let store_backend = match lookup("GUEST_STORE_BACKEND") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::Postgres,
        };

        let database_url = lookup("DATABASE_URL").filter(|u| !u.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when GUEST_STORE_BACKEND is postgres");
        }

        let max_file_bytes = match lookup("IMPORT_MAX_FILE_BYTES") {
            Some(value) => {
                let bytes: usize = value
                    .trim()
                    .parse()
                    .with_context(|| format!("IMPORT_MAX_FILE_BYTES is not a number: '{}'", value))?;
                if bytes == 0 {
                    anyhow::bail!("IMPORT_MAX_FILE_BYTES must be greater than zero");
                }
                bytes
            }
            None => DEFAULT_MAX_FILE_BYTES,
        };

        Ok(Self {
            nats_url,
            nats_user,
            nats_password,
            database_url,
            store_backend,
            max_file_bytes,
        })
    }

    /// `DATABASE_URL`, or an error naming what needed it
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}
