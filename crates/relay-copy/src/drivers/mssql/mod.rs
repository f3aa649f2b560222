//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlDataUtils`]: Tiberius-backed data-access collaborator

mod data_utils;
mod dialect;

pub use data_utils::{MssqlDataUtils, TiberiusConnectionManager};
pub use dialect::MssqlDialect;
