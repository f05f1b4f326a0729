//! Idempotent schema bootstrap.
//!
//! The schema definition is a plain SQL script made of
//! `CREATE TABLE IF NOT EXISTS` statements. Table names are extracted from
//! that clause only; tables created with any other phrasing are not tracked.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, info_span, Span};

use crate::app::{Result, RunnelError};
use crate::store::SchemaCatalog;

/// Schema shipped with the binary.
pub const DEFAULT_SCHEMA: &str = include_str!("../../migrations/schema.sql");

/// What a bootstrap run found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub required: Vec<String>,
    pub created: Vec<String>,
}

impl BootstrapReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

fn table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)CREATE TABLE IF NOT EXISTS\s+(\w+)").expect("valid table pattern")
    })
}

/// Table names declared by the schema, in declaration order without duplicates.
pub fn required_tables(schema_sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for captures in table_pattern().captures_iter(schema_sql) {
        let name = &captures[1];
        if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            tables.push(name.to_string());
        }
    }
    tables
}

/// Converges a store to a schema definition.
pub struct Bootstrapper {
    schema_sql: String,
    span: Span,
}

impl Bootstrapper {
    pub fn new(schema_sql: impl Into<String>) -> Self {
        Self {
            schema_sql: schema_sql.into(),
            span: info_span!("bootstrap"),
        }
    }

    /// Load the definition from a file instead of the built-in schema.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let sql = std::fs::read_to_string(path).map_err(|e| {
            RunnelError::Config(format!("Failed to read schema {}: {}", path.display(), e))
        })?;
        Ok(Self::new(sql))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn schema_sql(&self) -> &str {
        &self.schema_sql
    }

    /// Ensure every declared table exists.
    ///
    /// Existing tables are never altered. When anything is missing the whole
    /// definition is executed as one batch, then every table is checked again.
    pub fn run<C: SchemaCatalog + ?Sized>(&self, catalog: &C) -> Result<BootstrapReport> {
        let _guard = self.span.enter();

        let required = required_tables(&self.schema_sql);
        info!("Required tables: {:?}", required);

        let mut missing = Vec::new();
        for table in &required {
            if !catalog.table_exists(table)? {
                missing.push(table.clone());
            }
        }

        if missing.is_empty() {
            info!("All required tables exist");
            return Ok(BootstrapReport {
                required,
                created: Vec::new(),
            });
        }

        info!("Missing tables: {:?}. Attempting to create...", missing);
        catalog.execute_batch(&self.schema_sql)?;

        for table in &required {
            if !catalog.table_exists(table)? {
                return Err(RunnelError::SchemaConvergence {
                    table: table.clone(),
                });
            }
            debug!("Table {} present", table);
        }

        info!("Missing tables created successfully");
        Ok(BootstrapReport {
            required,
            created: missing,
        })
    }
}
