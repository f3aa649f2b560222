//! Core traits for engine-specific behavior.
//!
//! - [`Dialect`]: SQL text generation for one engine (quoting, literals,
//!   reserved words)
//! - [`DataUtils`]: the data-access collaborator the copy engine drives
//!   (introspection, DDL, views, and row streaming for in-process copies)

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::identifier::{is_plain_identifier, is_reserved, quote_literal};
use super::schema::{EngineKind, SourceColumn};
use super::value::Batch;
use crate::error::{CopyError, Result};

/// SQL syntax strategy for one engine.
pub trait Dialect: Send + Sync {
    /// Engine name (e.g., "mssql", "netezza").
    fn name(&self) -> &str;

    /// Quote an identifier for this engine.
    fn quote_ident(&self, name: &str) -> String;

    /// Words that cannot be used as bare column names.
    fn reserved_words(&self) -> &'static [&'static str];

    /// Quote a column name when it is reserved or not a plain identifier.
    fn escape_column_name(&self, name: &str) -> String {
        if is_reserved(name, self.reserved_words()) || !is_plain_identifier(name) {
            self.quote_ident(name)
        } else {
            name.to_string()
        }
    }

    /// Name a table for DDL issued against `database`.
    fn qualify_table(&self, database: &str, schema: &str, table: &str) -> String;

    /// Render a string literal. Control characters must survive the round trip.
    fn string_literal(&self, value: &str) -> String {
        quote_literal(value)
    }

    /// Cast a column expression to the engine's unbounded text type.
    fn cast_to_text(&self, expr: &str, data_type: &str) -> String;

    /// Select-list entry for an in-process read of one column. Types the
    /// row reader cannot decode natively are converted to text here.
    fn read_expression(&self, quoted: &str, data_type: &str) -> String {
        let _ = data_type;
        quoted.to_string()
    }

    /// Replace every occurrence of `from` with `to` inside `expr`.
    fn replace(&self, expr: &str, from: &str, to: &str) -> String {
        format!(
            "REPLACE({}, {}, {})",
            expr,
            self.string_literal(from),
            self.string_literal(to)
        )
    }

    /// Replace `expr` with `to` when the whole value equals `from`.
    fn replace_whole(&self, expr: &str, from: &str, to: &str) -> String {
        format!(
            "CASE WHEN {e} = {f} THEN {t} ELSE {e} END",
            e = expr,
            f = self.string_literal(from),
            t = self.string_literal(to)
        )
    }
}

/// Data-access collaborator for one engine endpoint.
///
/// Every operation names the database it runs against; implementations
/// may hold one pool for the whole server.
#[async_trait]
pub trait DataUtils: Send + Sync {
    fn engine(&self) -> EngineKind;

    /// Ordered column metadata. An empty list means the table was not found.
    async fn get_columns(
        &self,
        database: &str,
        table: &str,
        schema: &str,
    ) -> Result<Vec<SourceColumn>>;

    /// Run a statement that returns no rows. Returns rows affected when known.
    async fn execute_non_query(&self, database: &str, sql: &str) -> Result<u64>;

    /// Drop a table if present. Returns whether it existed.
    async fn drop_table_if_exists(&self, database: &str, table: &str, schema: &str)
        -> Result<bool>;

    async fn create_or_replace_view(&self, database: &str, view: &str, query: &str)
        -> Result<()>;

    /// Stream the rows of `query` in batches. `columns` describes the
    /// projected columns in order.
    fn read_rows(
        &self,
        database: &str,
        query: &str,
        columns: &[SourceColumn],
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let _ = (database, query, columns, batch_size);
        let (tx, rx) = mpsc::channel(1);
        let engine = self.engine();
        let _ = tx.try_send(Err(CopyError::Config(format!(
            "{} endpoints do not support in-process reads",
            engine
        ))));
        rx
    }

    /// Bulk insert a batch into an existing table. Returns rows written.
    async fn bulk_insert(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        batch: Batch,
    ) -> Result<u64> {
        let _ = (database, schema, table, batch);
        Err(CopyError::Config(format!(
            "{} endpoints do not support in-process writes",
            self.engine()
        )))
    }
}
