//! Netezza data access over ODBC.
//!
//! Netezza connections are scoped to a single database, so each call opens
//! a connection for the database it names. ODBC calls are serialized behind
//! a mutex.

use std::sync::Arc;

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::core::identifier::{quote_literal, validate_identifier};
use crate::core::schema::{EngineKind, SourceColumn, SqlKind};
use crate::core::traits::{DataUtils, Dialect};
use crate::error::{CopyError, Result};

use super::NetezzaDialect;

/// Netezza data-access collaborator.
pub struct NetezzaDataUtils {
    env: Arc<Environment>,
    config: EndpointConfig,
    dialect: NetezzaDialect,
    /// Serializes ODBC operations
    conn_mutex: Mutex<()>,
}

impl NetezzaDataUtils {
    pub async fn new(config: &EndpointConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            CopyError::pool(
                format!(
                    "Failed to create ODBC environment: {}. Make sure the {} driver is installed.",
                    e, config.driver
                ),
                "ODBC connection",
            )
        })?;

        debug!(
            "ODBC connection string (credentials hidden): Driver={{{}}};Server={};Port={};...",
            config.driver,
            config.host,
            config.port()
        );

        let utils = Self {
            env: Arc::new(env),
            config: config.clone(),
            dialect: NetezzaDialect::new(),
            conn_mutex: Mutex::new(()),
        };

        if !config.database.is_empty() {
            let _guard = utils.conn_mutex.lock().await;
            let conn = utils.get_connection(&config.database)?;
            conn.execute("SELECT 1", ())
                .map_err(|e| CopyError::pool(e, "testing Netezza connection"))?;
        }

        info!("Connected to Netezza via ODBC: {}:{}", config.host, config.port());
        Ok(utils)
    }

    fn get_connection(&self, database: &str) -> Result<odbc_api::Connection<'_>> {
        self.env
            .connect_with_connection_string(
                &self.config.odbc_connection_string(database),
                ConnectionOptions::default(),
            )
            .map_err(|e| {
                CopyError::pool(
                    format!("ODBC connection to {} failed: {}", database, e),
                    "getting ODBC connection",
                )
            })
    }

    /// Execute a query and return rows as text.
    fn execute_query(&self, database: &str, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let conn = self.get_connection(database)?;
        let mut rows = Vec::new();

        if let Some(mut cursor) = conn.execute(sql, ())? {
            let num_cols = cursor.num_result_cols()? as usize;
            let mut buffers = TextRowSet::for_cursor(1000, &mut cursor, Some(4096))?;
            let mut row_cursor = cursor.bind_buffer(&mut buffers)?;

            while let Some(batch) = row_cursor.fetch()? {
                for row_idx in 0..batch.num_rows() {
                    let row = (0..num_cols)
                        .map(|col_idx| {
                            batch
                                .at(col_idx, row_idx)
                                .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                        })
                        .collect();
                    rows.push(row);
                }
            }
        }

        Ok(rows)
    }

    fn execute_statement(&self, database: &str, sql: &str) -> Result<()> {
        let conn = self.get_connection(database)?;
        conn.execute(sql, ())?;
        Ok(())
    }
}

#[async_trait]
impl DataUtils for NetezzaDataUtils {
    fn engine(&self) -> EngineKind {
        EngineKind::Netezza
    }

    /// Netezza has no schema level below the database; `schema` is ignored.
    async fn get_columns(
        &self,
        database: &str,
        table: &str,
        _schema: &str,
    ) -> Result<Vec<SourceColumn>> {
        validate_identifier(table)?;
        let sql = format!(
            "SELECT ATTNAME, FORMAT_TYPE, ATTNOTNULL, ATTNUM FROM _V_RELATION_COLUMN \
             WHERE UPPER(NAME) = UPPER({}) ORDER BY ATTNUM",
            quote_literal(table)
        );

        let _guard = self.conn_mutex.lock().await;
        let rows = self.execute_query(database, &sql)?;

        let columns: Vec<SourceColumn> = rows
            .into_iter()
            .map(|row| {
                let mut cells = row.into_iter();
                let name = cells.next().flatten().unwrap_or_default();
                let format_type = cells.next().flatten().unwrap_or_default();
                let not_null = cells.next().flatten().unwrap_or_default();
                let ordinal = cells.next().flatten().unwrap_or_default();

                let mut column = parse_format_type(name.trim(), &format_type);
                column.is_nullable = !matches!(not_null.trim(), "t" | "T" | "1" | "true");
                column.ordinal_pos = ordinal.trim().parse().unwrap_or(0);
                column
            })
            .collect();

        debug!("Loaded {} columns for {}.{}", columns.len(), database, table);
        Ok(columns)
    }

    async fn execute_non_query(&self, database: &str, sql: &str) -> Result<u64> {
        let _guard = self.conn_mutex.lock().await;
        self.execute_statement(database, sql)?;
        Ok(0)
    }

    async fn drop_table_if_exists(
        &self,
        database: &str,
        table: &str,
        _schema: &str,
    ) -> Result<bool> {
        validate_identifier(table)?;
        let check = format!(
            "SELECT COUNT(*) FROM _V_TABLE WHERE UPPER(TABLENAME) = UPPER({})",
            quote_literal(table)
        );

        let _guard = self.conn_mutex.lock().await;
        let rows = self.execute_query(database, &check)?;
        let count: i64 = rows
            .first()
            .and_then(|r| r.first().cloned().flatten())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        if count == 0 {
            return Ok(false);
        }

        let drop = format!("DROP TABLE {}", self.dialect.qualify_table(database, "", table));
        self.execute_statement(database, &drop)?;
        debug!("Dropped {}.{}", database, table);
        Ok(true)
    }

    async fn create_or_replace_view(&self, database: &str, view: &str, query: &str) -> Result<()> {
        validate_identifier(view)?;
        let sql = format!(
            "CREATE OR REPLACE VIEW {} AS {}",
            self.dialect.escape_column_name(view),
            query
        );
        let _guard = self.conn_mutex.lock().await;
        self.execute_statement(database, &sql)
    }
}

/// Split a `FORMAT_TYPE` rendering such as `CHARACTER VARYING(20)` or
/// `NUMERIC(10,2)` into a column with a short type name and its modifiers.
pub fn parse_format_type(name: &str, format_type: &str) -> SourceColumn {
    let upper = format_type.trim().to_uppercase();
    let (base, args) = match upper.find('(') {
        Some(open) => {
            let close = upper.rfind(')').unwrap_or(upper.len());
            let inner = upper.get(open + 1..close).unwrap_or("");
            (upper[..open].trim().to_string(), inner.to_string())
        }
        None => (upper.clone(), String::new()),
    };

    let data_type = match base.as_str() {
        "CHARACTER VARYING" => "varchar".to_string(),
        "NATIONAL CHARACTER VARYING" => "nvarchar".to_string(),
        "CHARACTER" => "char".to_string(),
        "NATIONAL CHARACTER" => "nchar".to_string(),
        other => other.to_lowercase(),
    };

    let nums: Vec<i32> = args
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let mut column = SourceColumn::new(name, data_type);
    match (column.kind, nums.as_slice()) {
        (SqlKind::Decimal, [p, s]) => column = column.with_precision(*p, *s),
        (SqlKind::Decimal, [p]) => column = column.with_precision(*p, 0),
        (_, [len]) => column = column.with_length(*len),
        _ => {}
    }
    column
}
