//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server (Tiberius)
//! - [`mysql`]: MySQL/MariaDB (SQLx)
//! - [`netezza`]: Netezza (ODBC)
//!
//! Each driver provides a `Dialect` for SQL text generation and a
//! `DataUtils` collaborator for metadata, DDL and row access.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `DataUtils`
//! 3. Add an enum variant to `DialectImpl` and an arm to [`connect`]
//! 4. Register type rewrites in `TypeMapperCatalog::with_builtins()`

pub mod mssql;
pub mod mysql;
pub mod netezza;

pub use mssql::{MssqlDataUtils, MssqlDialect};
pub use mysql::{MysqlDataUtils, MysqlDialect};
pub use netezza::{NetezzaDataUtils, NetezzaDialect};

use std::sync::Arc;

use crate::config::EndpointConfig;
use crate::core::schema::EngineKind;
use crate::core::traits::{DataUtils, Dialect};
use crate::error::Result;

/// Enum-based static dispatch for dialects.
///
/// The compiler generates a match statement instead of vtable dispatch.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Mysql(MysqlDialect),
    Netezza(NetezzaDialect),
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.name(),
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Netezza(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.quote_ident(name),
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Netezza(d) => d.quote_ident(name),
        }
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        match self {
            DialectImpl::Mssql(d) => d.reserved_words(),
            DialectImpl::Mysql(d) => d.reserved_words(),
            DialectImpl::Netezza(d) => d.reserved_words(),
        }
    }

    fn escape_column_name(&self, name: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.escape_column_name(name),
            DialectImpl::Mysql(d) => d.escape_column_name(name),
            DialectImpl::Netezza(d) => d.escape_column_name(name),
        }
    }

    fn qualify_table(&self, database: &str, schema: &str, table: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.qualify_table(database, schema, table),
            DialectImpl::Mysql(d) => d.qualify_table(database, schema, table),
            DialectImpl::Netezza(d) => d.qualify_table(database, schema, table),
        }
    }

    fn string_literal(&self, value: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.string_literal(value),
            DialectImpl::Mysql(d) => d.string_literal(value),
            DialectImpl::Netezza(d) => d.string_literal(value),
        }
    }

    fn cast_to_text(&self, expr: &str, data_type: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.cast_to_text(expr, data_type),
            DialectImpl::Mysql(d) => d.cast_to_text(expr, data_type),
            DialectImpl::Netezza(d) => d.cast_to_text(expr, data_type),
        }
    }

    fn replace(&self, expr: &str, from: &str, to: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.replace(expr, from, to),
            DialectImpl::Mysql(d) => d.replace(expr, from, to),
            DialectImpl::Netezza(d) => d.replace(expr, from, to),
        }
    }

    fn read_expression(&self, quoted: &str, data_type: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.read_expression(quoted, data_type),
            DialectImpl::Mysql(d) => d.read_expression(quoted, data_type),
            DialectImpl::Netezza(d) => d.read_expression(quoted, data_type),
        }
    }

    fn replace_whole(&self, expr: &str, from: &str, to: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.replace_whole(expr, from, to),
            DialectImpl::Mysql(d) => d.replace_whole(expr, from, to),
            DialectImpl::Netezza(d) => d.replace_whole(expr, from, to),
        }
    }
}

impl DialectImpl {
    pub fn for_engine(engine: EngineKind) -> Self {
        match engine {
            EngineKind::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
            EngineKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            EngineKind::Netezza => DialectImpl::Netezza(NetezzaDialect::new()),
        }
    }
}

/// Open the data-access collaborator for an endpoint.
pub async fn connect(endpoint: &EndpointConfig) -> Result<Arc<dyn DataUtils>> {
    Ok(match endpoint.r#type {
        EngineKind::Mssql => Arc::new(MssqlDataUtils::new(endpoint).await?),
        EngineKind::Mysql => Arc::new(MysqlDataUtils::new(endpoint, 4).await?),
        EngineKind::Netezza => Arc::new(NetezzaDataUtils::new(endpoint).await?),
    })
}
