//! Database handle

use crate::config::{Config, CONFIG_FILE};
use crate::demo;
use crate::error::{Error, Result};
use crate::resultset::{ResultSet, ResultSetOptions};
use crate::schema::{ResultSource, SchemaRegistry};
use crate::storage::{MemoryStorage, Storage};
use std::path::Path;
use std::sync::Arc;

/// The main database handle: result sources plus the storage behind them
#[derive(Clone)]
pub struct Database {
    config: Config,
    schema: Arc<SchemaRegistry>,
    storage: Arc<dyn Storage>,
}

impl Database {
    /// Load schemas and in-memory tables from the configured directories
    pub async fn open(config: Config) -> Result<Self> {
        let schema = SchemaRegistry::load(&config.schema_path())?;
        let storage = MemoryStorage::open(&schema, config.data_path()).await?;
        tracing::info!(
            root = %config.root.display(),
            sources = schema.list().len(),
            dialect = ?config.dialect,
            "database opened"
        );
        Ok(Self::with_storage(config, schema, Arc::new(storage)))
    }

    /// Use any storage implementation
    pub fn with_storage(config: Config, schema: SchemaRegistry, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            schema: Arc::new(schema),
            storage,
        }
    }

    /// Create config, schema and data for the sample Artist / Album / Track
    /// database under `root`
    pub async fn init(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|source| Error::FileWriteError {
            path: root.to_path_buf(),
            source,
        })?;
        let config = Config::at(root);
        if !root.join(CONFIG_FILE).exists() {
            config.save()?;
        }

        let mut schema = SchemaRegistry::load(&config.schema_path())?;
        for source in demo::sources() {
            if schema.get(&source.name).is_err() {
                schema.register(source)?;
            }
        }
        schema.check_references()?;

        let storage = MemoryStorage::open(&schema, config.data_path()).await?;
        if storage.rows("artist").await?.is_empty() {
            demo::seed(&storage).await?;
        }
        storage.flush().await?;

        Ok(Self::with_storage(config, schema, Arc::new(storage)))
    }

    /// A resultset over every row of a source
    pub fn resultset(&self, source: &str) -> Result<ResultSet> {
        self.schema.get(source)?;
        Ok(ResultSet::new(
            source,
            Arc::clone(&self.schema),
            Arc::clone(&self.storage),
            ResultSetOptions::from(&self.config),
        ))
    }

    /// All sources, sorted by name
    pub fn sources(&self) -> Vec<&ResultSource> {
        self.schema.list()
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persist storage
    pub async fn flush(&self) -> Result<()> {
        self.storage.flush().await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("sources", &self.schema.list().len())
            .finish_non_exhaustive()
    }
}
