//! Identifier validation and quoting.
//!
//! Database, table, view and column names cannot be bound as parameters,
//! so every name that reaches generated SQL goes through this module:
//! validate first, then quote with the engine's delimiter and escape that
//! delimiter inside the name.

use crate::error::{CopyError, Result};

/// Maximum identifier length (conservative limit across engines).
/// - SQL Server: 128 characters
/// - Netezza: 128 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Quote a MySQL identifier using backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a SQL Server object with database and schema.
///
/// Returns `[database].[schema].[table]`.
pub fn qualify_mssql(database: &str, schema: &str, table: &str) -> Result<String> {
    Ok(format!(
        "{}.{}.{}",
        quote_mssql(database)?,
        quote_mssql(schema)?,
        quote_mssql(table)?
    ))
}

/// Qualify a MySQL table with its database.
pub fn qualify_mysql(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(database)?, quote_mysql(table)?))
}

/// Quote a string literal by doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Whether `name` can appear unquoted: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Case-insensitive membership test against a reserved-word list.
pub fn is_reserved(name: &str, reserved: &[&str]) -> bool {
    reserved.iter().any(|w| w.eq_ignore_ascii_case(name))
}
