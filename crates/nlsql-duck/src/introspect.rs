//! Schema provider backed by live introspection

use nlsql_schema::{SchemaDescription, SchemaProvider, TableDescriptor};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::{DuckGateway, ExecutionError};

/// Builds the schema description from `information_schema`
///
/// The first call introspects and the result is kept for the lifetime of the
/// provider. [`IntrospectedSchema::refresh`] needs exclusive access, so shared
/// holders always see a stable description.
pub struct IntrospectedSchema {
    gateway: Arc<DuckGateway>,
    name: String,
    cached: OnceLock<SchemaDescription>,
}

impl IntrospectedSchema {
    pub fn new(gateway: Arc<DuckGateway>, name: impl Into<String>) -> Self {
        Self {
            gateway,
            name: name.into(),
            cached: OnceLock::new(),
        }
    }

    /// Drop the cached description so the next call introspects again
    pub fn refresh(&mut self) {
        self.cached = OnceLock::new();
    }

    fn introspect(&self) -> Result<SchemaDescription, ExecutionError> {
        let mut tables = Vec::new();
        for table_name in self.gateway.list_tables()? {
            let columns = self.gateway.describe_table(&table_name)?;
            let mut table = TableDescriptor::new(table_name, "");
            table.columns = columns;
            tables.push(table);
        }
        Ok(SchemaDescription::new(self.name.clone(), tables))
    }
}

impl SchemaProvider for IntrospectedSchema {
    fn describe_schema(&self) -> SchemaDescription {
        self.cached
            .get_or_init(|| match self.introspect() {
                Ok(schema) => {
                    info!(tables = schema.tables.len(), "schema introspected");
                    schema
                }
                Err(e) => {
                    warn!("Schema introspection failed, grounding unavailable: {}", e);
                    SchemaDescription::default()
                }
            })
            .clone()
    }
}
