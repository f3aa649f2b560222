//! # relay-copy
//!
//! Copies single tables between heterogeneous database engines.
//!
//! Supported engine pairs:
//!
//! - **MSSQL → Netezza**: the source table is exported to a pipe-delimited
//!   flat file with `bcp` and loaded on the appliance host over secure shell
//! - **MSSQL → MSSQL** and **MySQL → MSSQL**: rows stream through this
//!   process into a TDS bulk insert
//!
//! Every copy first recreates the destination table from a column catalog
//! built out of the source table's metadata, with types rewritten for the
//! destination engine and string lengths shortened to configured limits.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relay_copy::{drivers, Config, CopySettings, CopySpec, CopyStrategy, TokioProcessRunner};
//!
//! # async fn example() -> relay_copy::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let source = drivers::connect(&config.source).await?;
//! let dest = drivers::connect(&config.destination).await?;
//! let strategy = CopyStrategy::select(
//!     config.source.r#type,
//!     config.destination.r#type,
//!     source,
//!     dest,
//!     Arc::new(TokioProcessRunner::new()),
//!     &CopySettings::from_config(&config),
//! )?;
//!
//! let spec = CopySpec::new(config.source.r#type, "Sales", "Orders", config.destination.r#type, "DW");
//! let report = strategy.copy_table(&spec).await?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod datacopy;
pub mod drivers;
pub mod error;
pub mod typemap;

#[cfg(test)]
mod testing;

pub use crate::config::Config;
pub use crate::core::{ColumnDescriptor, CopyReport, CopySpec, DataUtils, Dialect, EngineKind, SourceColumn};
pub use datacopy::{CopySettings, CopyStrategy, ProcessRunner, TokioProcessRunner};
pub use error::{CopyError, Result};
pub use typemap::TypeMapperCatalog;
