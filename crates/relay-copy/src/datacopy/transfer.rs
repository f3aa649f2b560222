//! In-process row transfer: the source streams batches over a channel and
//! the destination bulk inserts each one.
//!
//! Values are shaped to their destination columns on the way through:
//! decimals take the column scale and strings are cut to the declared
//! length. TDS bulk insert rejects a row that does neither.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::schema::{ColumnDescriptor, CopySpec, SourceColumn};
use crate::core::traits::{DataUtils, Dialect};
use crate::core::value::{Batch, SqlValue};
use crate::error::{CopyError, Result};

/// Select list over the original source column names.
pub fn build_select(source_dialect: &dyn Dialect, spec: &CopySpec, catalog: &[ColumnDescriptor]) -> String {
    let columns = catalog
        .iter()
        .map(|c| {
            let quoted = source_dialect.quote_ident(&c.source_name);
            source_dialect.read_expression(&quoted, &c.source_type_name)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {} FROM {}",
        columns,
        source_dialect.qualify_table(&spec.source_database, &spec.source_schema, &spec.source_table)
    )
}

/// How a value is shaped to fit its destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnFit {
    AsIs,
    Scale(u32),
    /// Maximum length in UTF-16 code units (`nchar`, `nvarchar`) or in
    /// characters and bytes otherwise.
    Length { limit: usize, utf16: bool },
}

impl ColumnFit {
    fn for_column(column: &ColumnDescriptor) -> Self {
        if let Some(scale) = column.value_scale() {
            return ColumnFit::Scale(scale);
        }
        match column.length_limit() {
            Some(limit) => ColumnFit::Length {
                limit,
                utf16: column.is_national_text(),
            },
            None => ColumnFit::AsIs,
        }
    }

    /// Shape `value` in place. Returns true when data was cut off.
    fn apply(&self, value: &mut SqlValue<'static>) -> bool {
        match (self, value) {
            (ColumnFit::Scale(scale), SqlValue::Decimal(d)) => {
                d.rescale(*scale);
                false
            }
            (ColumnFit::Length { limit, utf16 }, SqlValue::Text(s)) => match cut_point(s, *limit, *utf16) {
                Some(at) => {
                    s.to_mut().truncate(at);
                    true
                }
                None => false,
            },
            (ColumnFit::Length { limit, .. }, SqlValue::Bytes(b)) if b.len() > *limit => {
                b.to_mut().truncate(*limit);
                true
            }
            _ => false,
        }
    }
}

/// Byte offset where `s` must be cut to hold at most `limit` units, or
/// `None` when it already fits.
fn cut_point(s: &str, limit: usize, utf16: bool) -> Option<usize> {
    let mut units = 0;
    for (at, ch) in s.char_indices() {
        units += if utf16 { ch.len_utf16() } else { 1 };
        if units > limit {
            return Some(at);
        }
    }
    None
}

/// Shape every value of `batch` to its column. Returns values truncated.
fn fit_batch(fits: &[ColumnFit], batch: &mut Batch) -> u64 {
    let mut truncated = 0;
    for row in &mut batch.rows {
        for (value, fit) in row.iter_mut().zip(fits) {
            if fit.apply(value) {
                truncated += 1;
            }
        }
    }
    truncated
}

/// Copy all rows of `spec.source_table` into the already created destination
/// table, bounded by the copy timeout. Returns rows written.
pub async fn transfer_rows(
    source: &dyn DataUtils,
    dest: &dyn DataUtils,
    source_dialect: &dyn Dialect,
    spec: &CopySpec,
    catalog: &[ColumnDescriptor],
    batch_size: usize,
) -> Result<u64> {
    let query = build_select(source_dialect, spec, catalog);
    let columns: Vec<SourceColumn> = catalog
        .iter()
        .map(|c| SourceColumn::new(c.source_name.clone(), c.source_type_name.clone()))
        .collect();
    let fits: Vec<ColumnFit> = catalog.iter().map(ColumnFit::for_column).collect();

    info!(
        "Starting transfer for {} -> {}.{} (batch size {})",
        spec.source_table, spec.dest_database, spec.dest_table, batch_size
    );
    let start = Instant::now();

    let copy = async {
        let mut rx = source.read_rows(&spec.source_database, &query, &columns, batch_size);
        let mut total = 0u64;
        let mut truncated = 0u64;
        while let Some(batch) = rx.recv().await {
            let mut batch = batch?;
            let is_final = batch.is_final;
            if !batch.is_empty() {
                truncated += fit_batch(&fits, &mut batch);
                let written = dest
                    .bulk_insert(&spec.dest_database, &spec.source_schema, &spec.dest_table, batch)
                    .await?;
                total += written;
                debug!("{}: wrote {} rows (total: {})", spec.dest_table, written, total);
            }
            if is_final {
                break;
            }
        }
        if truncated > 0 {
            warn!(
                "{}: truncated {} values to the declared column lengths",
                spec.dest_table, truncated
            );
        }
        Ok::<u64, CopyError>(total)
    };

    let rows = tokio::time::timeout(Duration::from_secs(spec.timeout_secs), copy)
        .await
        .map_err(|_| {
            CopyError::transfer(
                &spec.source_table,
                format!("timed out after {}s", spec.timeout_secs),
            )
        })??;

    let elapsed = start.elapsed();
    let rows_per_sec = if elapsed.as_secs_f64() > 0.0 {
        (rows as f64 / elapsed.as_secs_f64()) as u64
    } else {
        0
    };
    info!(
        "{}: transferred {} rows in {:?} ({} rows/sec)",
        spec.source_table, rows, elapsed, rows_per_sec
    );
    Ok(rows)
}
