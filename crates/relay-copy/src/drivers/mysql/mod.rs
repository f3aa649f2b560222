//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlDataUtils`]: SQLx-backed data-access collaborator
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod data_utils;
mod dialect;

pub use data_utils::MysqlDataUtils;
pub use dialect::MysqlDialect;
