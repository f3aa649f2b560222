//! MySQL/MariaDB data access.
//!
//! Uses SQLx for connection pooling. MySQL is only ever a copy source here,
//! so the collaborator reads metadata and rows; DDL helpers exist for the
//! view and drop operations every collaborator offers.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Executor, Row, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::schema::{EngineKind, SourceColumn, SqlKind};
use crate::core::traits::DataUtils;
use crate::core::value::{Batch, ReadColumn, SqlNullType, SqlValue};
use crate::error::{CopyError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL data-access collaborator.
pub struct MysqlDataUtils {
    pool: MySqlPool,
}

impl MysqlDataUtils {
    pub async fn new(config: &EndpointConfig, max_conns: u32) -> Result<Self> {
        let ssl_mode = if config.encrypt {
            MySqlSslMode::Preferred
        } else {
            MySqlSslMode::Disabled
        };

        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);
        if !config.database.is_empty() {
            options = options.database(&config.database);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| CopyError::pool(e, "creating MySQL pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| CopyError::pool(e, "testing MySQL connection"))?;

        info!("Connected to MySQL: {}:{}", config.host, config.port());

        Ok(Self { pool })
    }

    /// Run a statement over the text protocol after switching database.
    /// `USE` cannot be prepared, so plain `&str` execution is required.
    async fn execute_in(&self, database: &str, sql: &str) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| CopyError::pool(e, "getting MySQL connection"))?;
        let use_db = format!("USE {}", quote_mysql(database)?);
        (&mut *conn).execute(use_db.as_str()).await?;
        let result = (&mut *conn).execute(sql).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DataUtils for MysqlDataUtils {
    fn engine(&self) -> EngineKind {
        EngineKind::Mysql
    }

    async fn get_columns(
        &self,
        database: &str,
        table: &str,
        _schema: &str,
    ) -> Result<Vec<SourceColumn>> {
        // CAST names to CHAR to sidestep collation differences; cap lengths at i32.
        // Unsigned integers report as `<type> unsigned`.
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(IF(
                    DATA_TYPE IN ('tinyint', 'smallint', 'mediumint', 'int', 'bigint')
                        AND COLUMN_TYPE LIKE '%unsigned%',
                    CONCAT(DATA_TYPE, ' unsigned'),
                    DATA_TYPE
                ) AS CHAR(255)) AS DATA_TYPE,
                CAST(CASE
                    WHEN CHARACTER_MAXIMUM_LENGTH IS NULL THEN 0
                    WHEN CHARACTER_MAXIMUM_LENGTH > 2147483647 THEN -1
                    ELSE CHARACTER_MAXIMUM_LENGTH
                END AS SIGNED) AS max_length,
                CAST(COALESCE(NUMERIC_PRECISION, 0) AS SIGNED) AS num_precision,
                CAST(COALESCE(NUMERIC_SCALE, 0) AS SIGNED) AS num_scale,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type: String = row.try_get("DATA_TYPE")?;
            columns.push(SourceColumn {
                name: row.try_get("COLUMN_NAME")?,
                kind: SqlKind::classify(&data_type),
                data_type,
                max_length: row.try_get::<i64, _>("max_length")? as i32,
                precision: row.try_get::<i64, _>("num_precision")? as i32,
                scale: row.try_get::<i64, _>("num_scale")? as i32,
                is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                ordinal_pos: row.try_get::<i64, _>("ORDINAL_POSITION")? as i32,
            });
        }

        debug!("Loaded {} columns for {}.{}", columns.len(), database, table);
        Ok(columns)
    }

    async fn execute_non_query(&self, database: &str, sql: &str) -> Result<u64> {
        self.execute_in(database, sql).await
    }

    async fn drop_table_if_exists(
        &self,
        database: &str,
        table: &str,
        _schema: &str,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
        )
        .bind(database)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        if count == 0 {
            return Ok(false);
        }

        let sql = format!("DROP TABLE {}", qualify_mysql(database, table)?);
        (&self.pool).execute(sql.as_str()).await?;
        debug!("Dropped {}.{}", database, table);
        Ok(true)
    }

    async fn create_or_replace_view(&self, database: &str, view: &str, query: &str) -> Result<()> {
        let sql = format!("CREATE OR REPLACE VIEW {} AS {}", quote_mysql(view)?, query);
        self.execute_in(database, &sql).await?;
        Ok(())
    }

    fn read_rows(
        &self,
        _database: &str,
        query: &str,
        columns: &[SourceColumn],
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(4);
        let pool = self.pool.clone();
        let query = query.to_string();
        let columns: Vec<ReadColumn> = columns.iter().map(ReadColumn::from).collect();

        tokio::spawn(async move {
            if let Err(e) = stream_rows(pool, query, columns, batch_size, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

async fn stream_rows(
    pool: MySqlPool,
    query: String,
    columns: Vec<ReadColumn>,
    batch_size: usize,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let mut rows = sqlx::query(&query).fetch(&pool);
    let mut buffer = Vec::with_capacity(batch_size);

    while let Some(row) = rows.try_next().await? {
        buffer.push(row_to_values(&row, &columns)?);

        if buffer.len() >= batch_size {
            let full = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size));
            if tx.send(Ok(Batch::new(full))).await.is_err() {
                return Ok(()); // Receiver dropped
            }
        }
    }

    let _ = tx.send(Ok(Batch::new(buffer).mark_final())).await;
    Ok(())
}

/// Decode one column of `row`, naming the column on failure.
fn get<'r, T>(row: &'r MySqlRow, idx: usize, column: &ReadColumn) -> Result<T>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<T, _>(idx)
        .map_err(|e| CopyError::decode(&column.name, &column.data_type, e))
}

/// Convert a MySQL row to SqlValue vector.
fn row_to_values(row: &MySqlRow, columns: &[ReadColumn]) -> Result<Vec<SqlValue<'static>>> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let is_null = row
                .try_get_raw(i)
                .map_err(|e| CopyError::decode(&column.name, &column.data_type, e))?
                .is_null();
            if is_null {
                return Ok(SqlValue::Null(null_type_for(&column.data_type)));
            }

            Ok(match column.data_type.as_str() {
                "tinyint" => SqlValue::I16(get::<i8>(row, i, column)? as i16),
                "tinyint unsigned" => SqlValue::I16(get::<u8>(row, i, column)? as i16),
                "smallint" => SqlValue::I16(get::<i16>(row, i, column)?),
                // YEAR carries the unsigned flag and fits in 16 bits
                "year" => SqlValue::I16(get::<u16>(row, i, column)? as i16),
                "smallint unsigned" => SqlValue::I32(get::<u16>(row, i, column)? as i32),
                "mediumint" | "int" | "integer" => SqlValue::I32(get::<i32>(row, i, column)?),
                "mediumint unsigned" => SqlValue::I32(get::<u32>(row, i, column)? as i32),
                "int unsigned" => SqlValue::I64(get::<u32>(row, i, column)? as i64),
                "bigint" => SqlValue::I64(get::<i64>(row, i, column)?),
                "bigint unsigned" => SqlValue::Decimal(Decimal::from(get::<u64>(row, i, column)?)),
                "float" => SqlValue::F32(get::<f32>(row, i, column)?),
                "double" | "real" => SqlValue::F64(get::<f64>(row, i, column)?),
                "decimal" | "numeric" => SqlValue::Decimal(get::<Decimal>(row, i, column)?),
                "bit" | "boolean" | "bool" => SqlValue::Bool(get::<bool>(row, i, column)?),
                "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                    SqlValue::Bytes(Cow::Owned(get::<Vec<u8>>(row, i, column)?))
                }
                "date" => SqlValue::Date(get::<chrono::NaiveDate>(row, i, column)?),
                "time" => SqlValue::Time(get::<chrono::NaiveTime>(row, i, column)?),
                "datetime" | "timestamp" => {
                    SqlValue::DateTime(get::<chrono::NaiveDateTime>(row, i, column)?)
                }
                // json, set and binary-collated text fail the strict String
                // type check but decode as UTF-8 text
                _ => SqlValue::Text(Cow::Owned(
                    row.try_get_unchecked::<String, _>(i)
                        .map_err(|e| CopyError::decode(&column.name, &column.data_type, e))?,
                )),
            })
        })
        .collect()
}

/// Get the appropriate null type for a MySQL data type.
fn null_type_for(data_type: &str) -> SqlNullType {
    match data_type {
        "tinyint" | "tinyint unsigned" | "smallint" | "year" => SqlNullType::I16,
        "smallint unsigned" | "mediumint" | "mediumint unsigned" | "int" | "integer" => {
            SqlNullType::I32
        }
        "int unsigned" | "bigint" => SqlNullType::I64,
        "bigint unsigned" => SqlNullType::Decimal,
        "float" => SqlNullType::F32,
        "double" | "real" => SqlNullType::F64,
        "decimal" | "numeric" => SqlNullType::Decimal,
        "bit" | "boolean" | "bool" => SqlNullType::Bool,
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            SqlNullType::Bytes
        }
        "date" => SqlNullType::Date,
        "time" => SqlNullType::Time,
        "datetime" | "timestamp" => SqlNullType::DateTime,
        _ => SqlNullType::String,
    }
}
