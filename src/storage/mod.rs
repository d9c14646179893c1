//! Storage layer for rset
//!
//! A resultset never talks to a database directly: it hands finished
//! specifications to a [`Storage`]. [`MemoryStorage`] is the bundled engine,
//! evaluating specifications over in-memory tables persisted as YAML.

mod eval;
mod memory;

pub use memory::MemoryStorage;

use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;
use rsql::{DeleteSpec, InsertSpec, SelectSpec, UpdateSpec};

/// Executes query specifications
#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows matched by a select, in result order
    async fn select(&self, spec: &SelectSpec) -> Result<Vec<Row>>;

    /// Number of rows a select would return
    async fn count(&self, spec: &SelectSpec) -> Result<u64>;

    /// Insert one row and return it as stored (defaults and generated keys filled in)
    async fn insert(&self, spec: &InsertSpec) -> Result<Row>;

    /// Returns the number of rows updated
    async fn update(&self, spec: &UpdateSpec) -> Result<u64>;

    /// Returns the number of rows deleted
    async fn delete(&self, spec: &DeleteSpec) -> Result<u64>;

    /// Persist pending changes
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
