//! Schema registry: the engine's view of which tables and columns exist.
//!
//! Extraction, compilation and validation all read a snapshot taken at the
//! start of a request, so a concurrent evolution never changes the schema
//! under a plan half-way through the pipeline.

use cq_protocol::{Schema, SchemaChange, TableSchema};
use cq_store::DataSource;
use tokio::sync::RwLock;

use crate::error::EngineResult;

#[derive(Default)]
pub struct SchemaRegistry {
    schema: RwLock<Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema: RwLock::new(schema),
        }
    }

    /// Register every table the source holds that is not yet known.
    /// Returns how many were added.
    pub async fn register_from_source(&self, source: &dyn DataSource) -> EngineResult<usize> {
        let mut added = 0;
        for name in source.list_tables().await? {
            if self.schema.read().await.table(&name).is_some() {
                continue;
            }
            self.register(source.get_schema(&name).await?).await?;
            added += 1;
        }
        Ok(added)
    }

    pub async fn register(&self, table: TableSchema) -> EngineResult<()> {
        let mut guard = self.schema.write().await;
        let name = table.name.clone();
        guard.register(table)?;
        tracing::info!(table = %name, version = guard.version, "table registered");
        Ok(())
    }

    /// Apply an explicit schema change and return the evolved table.
    pub async fn evolve(&self, table: &str, change: &SchemaChange) -> EngineResult<TableSchema> {
        let mut guard = self.schema.write().await;
        let evolved = guard.evolve(table, change)?;
        tracing::info!(table, version = guard.version, ?change, "schema evolved");
        Ok(evolved)
    }

    pub async fn snapshot(&self) -> Schema {
        self.schema.read().await.clone()
    }
}
