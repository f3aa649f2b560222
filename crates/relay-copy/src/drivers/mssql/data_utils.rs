//! MSSQL data access.
//!
//! Uses Tiberius with bb8 connection pooling. Every statement names its
//! database explicitly (three-part names or a leading `USE`), so a single
//! pool serves every database on the server.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Query, Row, TokenRow};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EndpointConfig;
use crate::core::identifier::{qualify_mssql, quote_literal, quote_mssql};
use crate::core::schema::{EngineKind, SourceColumn, SqlKind};
use crate::core::traits::DataUtils;
use crate::core::value::{Batch, ReadColumn, SqlNullType, SqlValue};
use crate::error::{CopyError, Result};

/// Scale of `money` and `smallmoney` values.
const MONEY_SCALE: u32 = 4;

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: EndpointConfig,
}

impl TiberiusConnectionManager {
    fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port());
        if !self.config.database.is_empty() {
            config.database(&self.config.database);
        }
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        // Long in-process copies can sit idle on one side while the other
        // side drains; keepalives stop middleboxes from dropping the socket.
        if let Ok(std_tcp) = tcp.into_std() {
            use std::net::TcpStream as StdTcpStream;
            let socket = socket2::Socket::from(std_tcp);

            let keepalive = socket2::TcpKeepalive::new()
                .with_time(TCP_KEEPALIVE_INTERVAL)
                .with_interval(TCP_KEEPALIVE_INTERVAL);

            if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
                warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
            }

            let std_tcp: StdTcpStream = socket.into();
            std_tcp.set_nonblocking(true).ok();
            let tcp = TcpStream::from_std(std_tcp).map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: format!("Failed to convert socket: {}", e),
            })?;

            Client::connect(config, tcp.compat_write()).await
        } else {
            warn!("Failed to configure TCP keepalives on MSSQL connection");
            let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
                tiberius::error::Error::Io {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            })?;
            tcp.set_nodelay(true).ok();
            Client::connect(config, tcp.compat_write()).await
        }
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL data-access collaborator.
pub struct MssqlDataUtils {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlDataUtils {
    /// Connect with a small default pool.
    pub async fn new(config: &EndpointConfig) -> Result<Self> {
        Self::with_pool_size(config, 4).await
    }

    pub async fn with_pool_size(config: &EndpointConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| CopyError::pool(e, "creating MSSQL pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CopyError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_results().await?;
        }

        info!(
            "Connected to MSSQL: {}:{} (pool_size={})",
            config.host,
            config.port(),
            max_size
        );

        Ok(Self { pool })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CopyError::pool(e, "getting MSSQL connection from pool"))
    }
}

#[async_trait]
impl DataUtils for MssqlDataUtils {
    fn engine(&self) -> EngineKind {
        EngineKind::Mssql
    }

    async fn get_columns(
        &self,
        database: &str,
        table: &str,
        schema: &str,
    ) -> Result<Vec<SourceColumn>> {
        let sql = format!(
            r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CAST(ISNULL(CHARACTER_MAXIMUM_LENGTH, 0) AS INT),
                CAST(ISNULL(NUMERIC_PRECISION, 0) AS INT),
                CAST(ISNULL(NUMERIC_SCALE, 0) AS INT),
                CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
                CAST(ORDINAL_POSITION AS INT)
            FROM {}.INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
            "#,
            quote_mssql(database)?
        );

        let mut query = Query::new(sql);
        query.bind(schema.to_string());
        query.bind(table.to_string());

        let mut conn = self.get_conn().await?;
        let rows = query.query(&mut *conn).await?.into_first_result().await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type = row.try_get::<&str, _>(1)?.unwrap_or_default().to_string();
            columns.push(SourceColumn {
                name: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                kind: SqlKind::classify(&data_type),
                data_type,
                max_length: row.try_get::<i32, _>(2)?.unwrap_or(0),
                precision: row.try_get::<i32, _>(3)?.unwrap_or(0),
                scale: row.try_get::<i32, _>(4)?.unwrap_or(0),
                is_nullable: row.try_get::<i32, _>(5)?.unwrap_or(0) == 1,
                ordinal_pos: row.try_get::<i32, _>(6)?.unwrap_or(0),
            });
        }

        debug!(
            "Loaded {} columns for {}.{}.{}",
            columns.len(),
            database,
            schema,
            table
        );
        Ok(columns)
    }

    async fn execute_non_query(&self, database: &str, sql: &str) -> Result<u64> {
        let batch = format!("USE {};\n{}", quote_mssql(database)?, sql);
        let mut conn = self.get_conn().await?;
        let result = conn.execute(batch, &[]).await?;
        Ok(result.total())
    }

    async fn drop_table_if_exists(
        &self,
        database: &str,
        table: &str,
        schema: &str,
    ) -> Result<bool> {
        let qualified = qualify_mssql(database, schema, table)?;
        let check = format!(
            "SELECT CASE WHEN OBJECT_ID(N{}, N'U') IS NULL THEN 0 ELSE 1 END",
            quote_literal(&qualified)
        );

        let mut conn = self.get_conn().await?;
        let existed = conn
            .simple_query(check)
            .await?
            .into_row()
            .await?
            .and_then(|row| row.try_get::<i32, _>(0).ok().flatten())
            .unwrap_or(0)
            == 1;

        if existed {
            conn.simple_query(format!("DROP TABLE {}", qualified))
                .await?
                .into_results()
                .await?;
            debug!("Dropped {}", qualified);
        }

        Ok(existed)
    }

    async fn create_or_replace_view(&self, database: &str, view: &str, query: &str) -> Result<()> {
        let view_name = format!("[dbo].{}", quote_mssql(view)?);
        // CREATE VIEW must start its own batch, hence the EXEC wrapper.
        let batch = format!(
            "USE {db};\nIF OBJECT_ID(N{obj}, N'V') IS NOT NULL DROP VIEW {view};\nEXEC(N{body});",
            db = quote_mssql(database)?,
            obj = quote_literal(&view_name),
            view = view_name,
            body = quote_literal(&format!("CREATE VIEW {} AS {}", view_name, query)),
        );

        let mut conn = self.get_conn().await?;
        conn.simple_query(batch).await?.into_results().await?;
        debug!("Created view {}.{}", database, view_name);
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

    async fn bulk_insert(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        batch: Batch,
    ) -> Result<u64> {
        if batch.rows.is_empty() {
            return Ok(0);
        }

        let qualified_table = qualify_mssql(database, schema, table)?;
        let mut conn = self.get_conn().await?;

        let mut bulk_load = conn.bulk_insert(&qualified_table).await.map_err(|e| {
            CopyError::transfer(&qualified_table, format!("bulk insert init: {}", e))
        })?;

        let mut total_inserted = 0u64;
        for row in &batch.rows {
            let mut token_row = TokenRow::new();
            for value in row {
                token_row.push(sql_value_to_column_data(value));
            }
            bulk_load.send(token_row).await.map_err(|e| {
                CopyError::transfer(&qualified_table, format!("bulk insert send: {}", e))
            })?;
            total_inserted += 1;
        }

        bulk_load.finalize().await.map_err(|e| {
            CopyError::transfer(&qualified_table, format!("bulk insert finalize: {}", e))
        })?;

        Ok(total_inserted)
    }
}

async fn stream_rows(
    pool: Pool<TiberiusConnectionManager>,
    query: String,
    columns: Vec<ReadColumn>,
    batch_size: usize,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| CopyError::pool(e, "getting MSSQL connection for read"))?;

    let mut rows = conn.simple_query(query).await?.into_row_stream();
    let mut buffer = Vec::with_capacity(batch_size);

    while let Some(row) = rows.try_next().await? {
        let values = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| convert_row_value(&row, idx, column))
            .collect::<Result<Vec<_>>>()?;
        buffer.push(values);

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

/// Read one column of `row`. A value that does not decode as `T` is an
/// error naming the column rather than a NULL.
fn get<'a, T>(row: &'a Row, idx: usize, column: &ReadColumn) -> Result<Option<T>>
where
    T: tiberius::FromSql<'a>,
{
    row.try_get::<T, _>(idx)
        .map_err(|e| CopyError::decode(&column.name, &column.data_type, e))
}

/// Convert a row value to SqlValue based on the source column type.
fn convert_row_value(row: &Row, idx: usize, column: &ReadColumn) -> Result<SqlValue<'static>> {
    let value = match column.data_type.as_str() {
        "bit" => get::<bool>(row, idx, column)?.map(SqlValue::Bool),
        "tinyint" => get::<u8>(row, idx, column)?.map(|v| SqlValue::I16(v as i16)),
        "smallint" => get::<i16>(row, idx, column)?.map(SqlValue::I16),
        "int" => get::<i32>(row, idx, column)?.map(SqlValue::I32),
        "bigint" => get::<i64>(row, idx, column)?.map(SqlValue::I64),
        "real" => get::<f32>(row, idx, column)?.map(SqlValue::F32),
        "float" => get::<f64>(row, idx, column)?.map(SqlValue::F64),
        "uniqueidentifier" => get::<Uuid>(row, idx, column)?.map(SqlValue::Uuid),
        "datetime" | "datetime2" | "smalldatetime" => {
            get::<NaiveDateTime>(row, idx, column)?.map(SqlValue::DateTime)
        }
        "datetimeoffset" => {
            get::<DateTime<FixedOffset>>(row, idx, column)?.map(SqlValue::DateTimeOffset)
        }
        "date" => get::<NaiveDate>(row, idx, column)?.map(SqlValue::Date),
        "time" => get::<NaiveTime>(row, idx, column)?.map(SqlValue::Time),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => {
            get::<&[u8]>(row, idx, column)?.map(|v| SqlValue::Bytes(Cow::Owned(v.to_vec())))
        }
        "decimal" | "numeric" => get::<Decimal>(row, idx, column)?.map(SqlValue::Decimal),
        // TDS delivers money as a float scaled by 10^4
        "money" | "smallmoney" => match get::<f64>(row, idx, column)? {
            Some(v) => {
                let d = Decimal::from_f64_retain(v).ok_or_else(|| {
                    CopyError::decode(&column.name, &column.data_type, "money value out of range")
                })?;
                Some(SqlValue::Decimal(d.round_dp(MONEY_SCALE)))
            }
            None => None,
        },
        _ => get::<&str>(row, idx, column)?.map(|s| SqlValue::Text(Cow::Owned(s.to_string()))),
    };
    Ok(value.unwrap_or_else(|| SqlValue::Null(null_type_for(&column.data_type))))
}

/// NULL wire type for a source column type.
fn null_type_for(data_type: &str) -> SqlNullType {
    match data_type {
        "bit" => SqlNullType::Bool,
        "tinyint" | "smallint" => SqlNullType::I16,
        "int" => SqlNullType::I32,
        "bigint" => SqlNullType::I64,
        "real" => SqlNullType::F32,
        "float" => SqlNullType::F64,
        "uniqueidentifier" => SqlNullType::Uuid,
        "datetime" | "datetime2" | "smalldatetime" => SqlNullType::DateTime,
        "datetimeoffset" => SqlNullType::DateTimeOffset,
        "date" => SqlNullType::Date,
        "time" => SqlNullType::Time,
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => SqlNullType::Bytes,
        "decimal" | "numeric" | "money" | "smallmoney" => SqlNullType::Decimal,
        _ => SqlNullType::String,
    }
}

/// Days since 0001-01-01, the TDS date epoch.
fn tds_days(date: NaiveDate) -> Option<u32> {
    u32::try_from(date.num_days_from_ce() - 1).ok()
}

/// 100ns increments since midnight, the scale-7 TDS time encoding.
fn tds_time(time: NaiveTime) -> tiberius::time::Time {
    let nanos = time.num_seconds_from_midnight() as u64 * 1_000_000_000 + time.nanosecond() as u64;
    tiberius::time::Time::new(nanos / 100, 7)
}

fn tds_datetime2(dt: NaiveDateTime) -> Option<tiberius::time::DateTime2> {
    let days = tds_days(dt.date())?;
    Some(tiberius::time::DateTime2::new(
        tiberius::time::Date::new(days),
        tds_time(dt.time()),
    ))
}

fn sql_value_to_column_data(value: &SqlValue<'_>) -> ColumnData<'static> {
    match value {
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Bool => ColumnData::Bit(None),
            SqlNullType::I16 => ColumnData::I16(None),
            SqlNullType::I32 => ColumnData::I32(None),
            SqlNullType::I64 => ColumnData::I64(None),
            SqlNullType::F32 => ColumnData::F32(None),
            SqlNullType::F64 => ColumnData::F64(None),
            SqlNullType::String => ColumnData::String(None),
            SqlNullType::Bytes => ColumnData::Binary(None),
            SqlNullType::Uuid => ColumnData::Guid(None),
            SqlNullType::Decimal => ColumnData::Numeric(None),
            SqlNullType::DateTime => ColumnData::DateTime2(None),
            SqlNullType::DateTimeOffset => ColumnData::DateTimeOffset(None),
            SqlNullType::Date => ColumnData::Date(None),
            SqlNullType::Time => ColumnData::Time(None),
        },
        SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
        SqlValue::I16(i) => ColumnData::I16(Some(*i)),
        SqlValue::I32(i) => ColumnData::I32(Some(*i)),
        SqlValue::I64(i) => ColumnData::I64(Some(*i)),
        SqlValue::F32(f) => ColumnData::F32(Some(*f).filter(|f| f.is_finite())),
        SqlValue::F64(f) => ColumnData::F64(Some(*f).filter(|f| f.is_finite())),
        SqlValue::Text(s) => ColumnData::String(Some(Cow::Owned(s.to_string()))),
        SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.to_vec()))),
        SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
        SqlValue::Decimal(d) => ColumnData::Numeric(Some(
            tiberius::numeric::Numeric::new_with_scale(d.mantissa(), d.scale() as u8),
        )),
        SqlValue::DateTime(dt) => ColumnData::DateTime2(tds_datetime2(*dt)),
        SqlValue::DateTimeOffset(dto) => ColumnData::DateTimeOffset(
            tds_datetime2(dto.naive_utc()).map(|dt2| {
                let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
                tiberius::time::DateTimeOffset::new(dt2, offset_minutes)
            }),
        ),
        SqlValue::Date(d) => ColumnData::Date(tds_days(*d).map(tiberius::time::Date::new)),
        SqlValue::Time(t) => ColumnData::Time(Some(tds_time(*t))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacopy::catalog::{CatalogBuilder, ShorteningRules};
    use crate::typemap::TypeMapperCatalog;

    fn describe(column: SourceColumn) -> crate::core::schema::ColumnDescriptor {
        CatalogBuilder::new(
            EngineKind::Mssql,
            EngineKind::Mssql,
            TypeMapperCatalog::with_builtins(),
            ShorteningRules::default(),
        )
        .describe_column("t", &column)
    }

    #[test]
    fn test_tinyint_copies_into_smallint() {
        assert_eq!(describe(SourceColumn::new("Level", "tinyint")).dest_type(), "smallint");
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::I16(5)),
            ColumnData::I16(Some(5))
        ));
        assert_eq!(null_type_for("tinyint"), SqlNullType::I16);
    }

    #[test]
    fn test_decimal_column_scale_matches_value_scale() {
        let column = describe(SourceColumn::new("Amount", "decimal").with_precision(10, 2));
        assert_eq!(column.dest_type(), "decimal(10,2)");

        let mut value = Decimal::new(5, 0);
        value.rescale(column.value_scale().unwrap());
        match sql_value_to_column_data(&SqlValue::Decimal(value)) {
            ColumnData::Numeric(Some(n)) => assert_eq!(n.scale(), 2),
            other => panic!("unexpected column data: {:?}", other),
        }
    }

    #[test]
    fn test_tds_days_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        assert_eq!(tds_days(epoch), Some(0));
        let d = NaiveDate::from_ymd_opt(1, 1, 31).unwrap();
        assert_eq!(tds_days(d), Some(30));
    }

    #[test]
    fn test_null_keeps_type_hint() {
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::Null(SqlNullType::Date)),
            ColumnData::Date(None)
        ));
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::Null(SqlNullType::String)),
            ColumnData::String(None)
        ));
    }

    #[test]
    fn test_null_type_follows_source_type() {
        assert_eq!(null_type_for("money"), SqlNullType::Decimal);
        assert_eq!(null_type_for("rowversion"), SqlNullType::Bytes);
        assert_eq!(null_type_for("xml"), SqlNullType::String);
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::F64(f64::NAN)),
            ColumnData::F64(None)
        ));
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::F64(1.5)),
            ColumnData::F64(Some(_))
        ));
    }

    #[test]
    fn test_decimal_keeps_scale() {
        let d = Decimal::new(12345, 2);
        match sql_value_to_column_data(&SqlValue::Decimal(d)) {
            ColumnData::Numeric(Some(n)) => {
                assert_eq!(n.scale(), 2);
                assert_eq!(n.value(), 12345);
            }
            other => panic!("unexpected column data: {:?}", other),
        }
    }
}
