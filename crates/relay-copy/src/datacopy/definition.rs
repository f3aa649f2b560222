//! Destination table definition sync.

use tracing::info;

use crate::core::identifier::validate_identifier;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::{DataUtils, Dialect};
use crate::error::{CopyError, Result};

/// Destination-specific parts of a CREATE TABLE statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionOptions {
    /// Trailing clause, e.g. a distribution key.
    pub layout: Option<String>,
    /// Emit NULL for nullable source columns instead of NOT NULL everywhere.
    pub keep_nullability: bool,
}

impl DefinitionOptions {
    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn keeping_nullability(mut self) -> Self {
        self.keep_nullability = true;
        self
    }
}

/// Render the CREATE TABLE statement for a catalog.
///
/// Every check runs here, so a statement that comes back `Ok` is safe to
/// issue after the existing table has been dropped.
pub fn build_create_statement(
    dialect: &dyn Dialect,
    database: &str,
    schema: &str,
    table: &str,
    catalog: &[ColumnDescriptor],
    options: &DefinitionOptions,
) -> Result<String> {
    validate_identifier(database)?;
    validate_identifier(table)?;

    if catalog.is_empty() {
        return Err(CopyError::Config(format!(
            "cannot create {} without columns",
            table
        )));
    }

    for column in catalog {
        validate_identifier(&column.source_name)?;
        let bad_length = column.is_shortened_string_type && column.declared_length.unwrap_or(0) <= 0;
        let bad_precision =
            column.is_shortened_numeric_type && column.declared_precision.unwrap_or(0) <= 0;
        if bad_length || bad_precision {
            return Err(CopyError::Config(format!(
                "column {}.{} has no positive length or precision for {}",
                table, column.source_name, column.dest_type_name
            )));
        }
    }

    let columns = catalog
        .iter()
        .map(|c| {
            if options.keep_nullability {
                c.nullable_definition()
            } else {
                c.definition()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "CREATE TABLE {} ( {} )",
        dialect.qualify_table(database, schema, table),
        columns
    );
    if let Some(clause) = options.layout.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        sql.push(' ');
        sql.push_str(clause);
    }
    sql.push(';');
    Ok(sql)
}

/// Drop the destination table if present and recreate it from `catalog`.
///
/// Returns whether the table existed beforehand.
pub async fn sync_definition(
    dest: &dyn DataUtils,
    dialect: &dyn Dialect,
    database: &str,
    schema: &str,
    table: &str,
    catalog: &[ColumnDescriptor],
    options: &DefinitionOptions,
) -> Result<bool> {
    let create = build_create_statement(dialect, database, schema, table, catalog, options)?;

    let existed = dest.drop_table_if_exists(database, table, schema).await?;
    dest.execute_non_query(database, &create).await?;

    info!(
        "{} {}.{} with {} columns",
        if existed { "Recreated" } else { "Created" },
        database,
        table,
        catalog.len()
    );
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{EngineKind, SourceColumn};
    use crate::datacopy::catalog::{CatalogBuilder, ShorteningRules};
    use crate::drivers::{MssqlDialect, NetezzaDialect};
    use crate::testing::{Call, RecordingDataUtils};
    use crate::typemap::TypeMapperCatalog;

    fn catalog() -> Vec<ColumnDescriptor> {
        CatalogBuilder::new(
            EngineKind::Mssql,
            EngineKind::Netezza,
            TypeMapperCatalog::with_builtins(),
            ShorteningRules::new(Some(500), Vec::new()),
        )
        .describe_columns(
            "Orders",
            &[
                SourceColumn::new("Id", "int").not_null(),
                SourceColumn::new("Note", "nvarchar").with_length(4000),
            ],
        )
    }

    #[test]
    fn test_create_statement_with_layout() {
        let sql = build_create_statement(
            &NetezzaDialect::new(),
            "DW",
            "dbo",
            "Orders",
            &catalog(),
            &DefinitionOptions::default().with_layout("DISTRIBUTE ON RANDOM"),
        )
        .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE Orders ( Id int NOT NULL, Note nvarchar(500) NOT NULL ) DISTRIBUTE ON RANDOM;"
        );
    }

    #[test]
    fn test_create_statement_mssql_keeps_nullability() {
        let options = DefinitionOptions::default().keeping_nullability();
        let sql =
            build_create_statement(&MssqlDialect::new(), "Archive", "dbo", "Orders", &catalog(), &options)
                .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE [Archive].[dbo].[Orders] ( Id int NOT NULL, Note nvarchar(500) NULL );"
        );
    }

    #[test]
    fn test_invalid_catalog_rejected() {
        let d = NetezzaDialect::new();
        assert!(build_create_statement(&d, "DW", "dbo", "Orders", &[], &DefinitionOptions::default()).is_err());

        let mut bad = catalog();
        bad[1].declared_length = Some(0);
        assert!(build_create_statement(&d, "DW", "dbo", "Orders", &bad, &DefinitionOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_invalid_catalog_never_drops() {
        let dest = RecordingDataUtils::new(EngineKind::Netezza).with_existing_table("Orders");
        let result = sync_definition(&dest, &NetezzaDialect::new(), "DW", "dbo", "Orders", &[], &DefinitionOptions::default()).await;
        assert!(result.is_err());
        assert!(dest.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_twice_is_idempotent() {
        let dest = RecordingDataUtils::new(EngineKind::Netezza);
        let d = NetezzaDialect::new();
        let cat = catalog();

        let first = sync_definition(&dest, &d, "DW", "dbo", "Orders", &cat, &DefinitionOptions::default()).await.unwrap();
        let second = sync_definition(&dest, &d, "DW", "dbo", "Orders", &cat, &DefinitionOptions::default()).await.unwrap();
        assert!(!first);
        assert!(second);

        let creates: Vec<String> = dest
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Execute { sql, .. } => Some(sql),
                _ => None,
            })
            .collect();
        assert_eq!(creates.len(), 2);
        assert_eq!(creates[0], creates[1]);
    }
}
