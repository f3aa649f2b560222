//! Column catalog construction.
//!
//! Turns source column metadata into the ordered destination catalog:
//! mapped type names, length and precision annotations, reserved-word
//! escaping and the export projection for each column.

use tracing::{debug, info};

use crate::core::schema::{
    ColumnDescriptor, ColumnLengthOverride, CopySpec, EngineKind, SourceColumn, SqlKind, MAX_LENGTH,
};
use crate::core::traits::{DataUtils, Dialect};
use crate::drivers::DialectImpl;
use crate::error::{CopyError, Result};
use crate::typemap::TypeMapperCatalog;

use super::projection::projection_expression;

/// `varchar`, `nvarchar` and `varbinary` accept a `(max)` length.
fn is_variable_width(type_name: &str) -> bool {
    matches!(
        type_name.to_lowercase().as_str(),
        "varchar" | "nvarchar" | "varbinary"
    )
}

/// Precision used when the source reports none.
pub const DEFAULT_NUMERIC_PRECISION: i32 = 18;

/// Length rules for shortened string columns.
#[derive(Debug, Clone, Default)]
pub struct ShorteningRules {
    /// Engine-wide length applied when no per-column override exists.
    pub default_length: Option<i32>,
    pub overrides: Vec<ColumnLengthOverride>,
}

impl ShorteningRules {
    pub fn new(default_length: Option<i32>, overrides: Vec<ColumnLengthOverride>) -> Self {
        Self {
            default_length,
            overrides,
        }
    }

    /// Per-column override, matched case-insensitively on table and column.
    pub fn override_for(&self, table: &str, column: &str) -> Option<i32> {
        self.overrides
            .iter()
            .find(|o| {
                o.table_name.eq_ignore_ascii_case(table) && o.column_name.eq_ignore_ascii_case(column)
            })
            .map(|o| o.override_length)
    }

    /// Declared length for a shortened string column. First match wins:
    /// override, engine-wide default, clamped source length, engine ceiling.
    pub fn string_length(&self, table: &str, column: &str, source_length: i32, ceiling: i32) -> i32 {
        if let Some(len) = self.override_for(table, column) {
            return len;
        }
        if let Some(default) = self.default_length {
            return if source_length > 0 {
                source_length.min(default)
            } else {
                default
            };
        }
        if source_length > 0 {
            source_length.min(ceiling)
        } else {
            ceiling
        }
    }
}

/// Builds destination catalogs for one (source, destination) engine pair.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    source_engine: EngineKind,
    dest_engine: EngineKind,
    source_dialect: DialectImpl,
    dest_dialect: DialectImpl,
    type_mapper: TypeMapperCatalog,
    rules: ShorteningRules,
}

impl CatalogBuilder {
    pub fn new(
        source_engine: EngineKind,
        dest_engine: EngineKind,
        type_mapper: TypeMapperCatalog,
        rules: ShorteningRules,
    ) -> Self {
        Self {
            source_engine,
            dest_engine,
            source_dialect: DialectImpl::for_engine(source_engine),
            dest_dialect: DialectImpl::for_engine(dest_engine),
            type_mapper,
            rules,
        }
    }

    pub fn engines(&self) -> (EngineKind, EngineKind) {
        (self.source_engine, self.dest_engine)
    }

    pub fn source_dialect(&self) -> &DialectImpl {
        &self.source_dialect
    }

    pub fn dest_dialect(&self) -> &DialectImpl {
        &self.dest_dialect
    }

    /// Describe one source column in destination terms.
    pub fn describe_column(&self, original_table: &str, column: &SourceColumn) -> ColumnDescriptor {
        let mapped = self
            .type_mapper
            .map_data_type(self.source_engine, self.dest_engine, &column.data_type);

        let mut descriptor = ColumnDescriptor {
            name: self.dest_dialect.escape_column_name(&column.name),
            source_name: column.name.clone(),
            source_type_name: column.data_type.clone(),
            dest_type_name: mapped.clone(),
            is_shortened_string_type: false,
            is_shortened_numeric_type: false,
            declared_length: None,
            declared_precision: None,
            declared_scale: None,
            projection_expression: projection_expression(&self.source_dialect, column),
            source_nullable: column.is_nullable,
        };

        // A rewritten type keeps its own annotation. A rewrite to a bare
        // string or decimal name is annotated like the native type.
        let kind = if mapped == column.data_type {
            column.kind
        } else {
            match SqlKind::classify(&mapped) {
                k @ (SqlKind::Character | SqlKind::Binary | SqlKind::Decimal) if !mapped.contains('(') => k,
                _ => return descriptor,
            }
        };

        match kind {
            SqlKind::Character | SqlKind::Binary => {
                descriptor.is_shortened_string_type = true;
                descriptor.declared_length = Some(self.string_length(original_table, column, &mapped));
            }
            SqlKind::Decimal => {
                let precision = if column.precision > 0 {
                    column.precision
                } else {
                    DEFAULT_NUMERIC_PRECISION
                };
                descriptor.is_shortened_numeric_type = true;
                descriptor.declared_precision = Some(precision);
                // Bulk-inserted values carry their scale and must match the column
                if self.dest_engine == EngineKind::Mssql {
                    descriptor.declared_scale = Some(column.scale.clamp(0, precision));
                }
            }
            SqlKind::LongText | SqlKind::Other => {}
        }

        descriptor
    }

    fn string_length(&self, original_table: &str, column: &SourceColumn, dest_type: &str) -> i32 {
        let ceiling = self.dest_engine.max_string_length();
        let length = self
            .rules
            .string_length(original_table, &column.name, column.max_length, ceiling);

        let source_wider = column.max_length <= 0 || column.max_length > ceiling;
        let unbounded = length > ceiling || (length == ceiling && source_wider);
        if self.dest_engine == EngineKind::Mssql && unbounded && is_variable_width(dest_type) {
            MAX_LENGTH
        } else {
            length
        }
    }

    /// Describe every column in declared order.
    pub fn describe_columns(&self, original_table: &str, columns: &[SourceColumn]) -> Vec<ColumnDescriptor> {
        columns
            .iter()
            .map(|c| self.describe_column(original_table, c))
            .collect()
    }

    /// Introspect the source table and build its catalog.
    pub async fn build_catalog(&self, source: &dyn DataUtils, spec: &CopySpec) -> Result<Vec<ColumnDescriptor>> {
        let columns = source
            .get_columns(&spec.source_database, &spec.source_table, &spec.source_schema)
            .await?;

        if columns.is_empty() {
            return Err(CopyError::SourceTableNotFound {
                database: spec.source_database.clone(),
                schema: spec.source_schema.clone(),
                table: spec.source_table.clone(),
            });
        }

        let catalog = self.describe_columns(&spec.original_table_name, &columns);
        for c in &catalog {
            debug!("{}: {} {} -> {}", spec.source_table, c.source_name, c.source_type_name, c.dest_type());
        }
        info!(
            "Built catalog for {}.{}.{}: {} columns",
            spec.source_database,
            spec.source_schema,
            spec.source_table,
            catalog.len()
        );
        Ok(catalog)
    }
}
