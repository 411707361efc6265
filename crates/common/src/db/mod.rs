//! Database layer
//!
//! Connection pooling with read/write split and the repository over the
//! workspace, message, sync-run, and embedding tables.

pub mod models;
pub mod repository;

use crate::config::DatabaseConfig;
use crate::errors::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

pub use repository::{NewEmbedding, Repository, UpsertOutcome};

/// Database connection pool with read/write split
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (writes)
    primary: DatabaseConnection,

    /// Read replica connection (reads), falls back to primary
    replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let primary = Self::connect(&config.url, config).await?;

        let replica = match &config.read_url {
            Some(read_url) if read_url != &config.url => {
                Some(Self::connect(read_url, config).await?)
            }
            _ => None,
        };

        Ok(Self { primary, replica })
    }

    async fn connect(url: &str, config: &DatabaseConfig) -> Result<DatabaseConnection> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        Ok(Database::connect(options).await?)
    }

    /// Connection for writes
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Connection for reads (replica when configured)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Verify connectivity on both connections
    pub async fn ping(&self) -> Result<()> {
        self.primary.ping().await?;
        if let Some(replica) = &self.replica {
            replica.ping().await?;
        }
        Ok(())
    }
}
