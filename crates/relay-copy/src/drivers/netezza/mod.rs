//! Netezza driver.
//!
//! Netezza is reached through its ODBC driver for metadata and DDL. Bulk
//! data never flows through this connection; it is staged as a flat file
//! and loaded by a script on the appliance host.

mod data_utils;
mod dialect;

pub use data_utils::{parse_format_type, NetezzaDataUtils};
pub use dialect::NetezzaDialect;
