//! Error types for the copy engine.

use thiserror::Error;

use crate::core::schema::EngineKind;

/// Process exit codes reported by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_SOURCE_ERROR: u8 = 2;
pub const EXIT_DATABASE_ERROR: u8 = 3;
pub const EXIT_EXTRACTION_ERROR: u8 = 4;
pub const EXIT_LOAD_ERROR: u8 = 5;
pub const EXIT_TRANSFER_ERROR: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source table could not be introspected (missing or no columns).
    #[error("Source table not found: {database}.{schema}.{table}")]
    SourceTableNotFound {
        database: String,
        schema: String,
        table: String,
    },

    /// No copy strategy exists for this engine pair.
    #[error("Copying from {source_engine} to {dest_engine} is not implemented")]
    UnsupportedEnginePair {
        source_engine: EngineKind,
        dest_engine: EngineKind,
    },

    /// Bulk export did not finish in time and was killed.
    #[error("Extraction of table {table} timed out after {timeout_secs}s\n{output}")]
    ExtractionTimeout {
        table: String,
        timeout_secs: u64,
        output: String,
    },

    /// Bulk export exited with a failure.
    #[error("Extraction of table {table} failed (exit code {exit_code:?}):\n{output}")]
    ExtractionProcessFailed {
        table: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// Remote load did not finish in time and was killed.
    #[error("Load of table {table} timed out after {timeout_secs}s\n{output}")]
    LoadTimeout {
        table: String,
        timeout_secs: u64,
        output: String,
    },

    /// Remote load exited with a failure.
    #[error("Load of table {table} failed (exit code {exit_code:?}):\n{output}")]
    LoadProcessFailed {
        table: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The remote host key was refused by the secure shell client.
    #[error("Load of table {table} aborted: remote host key not verified\n{output}")]
    RemoteHostKeyUnverified { table: String, output: String },

    /// The load script could not find the staged file.
    #[error("Load of table {table} failed: staged file missing on remote host\n{output}")]
    RemoteFileMissing { table: String, output: String },

    /// The load script never reported completion.
    #[error("Load of table {table} did not report completion\n{output}")]
    LoadIncomplete { table: String, output: String },

    /// MSSQL connection or query error
    #[error("MSSQL error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// MySQL connection or query error
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// ODBC (Netezza) connection or query error
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// In-process row transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A source value could not be read as its column's type
    #[error("Cannot read column {column} ({data_type}): {message}")]
    Decode {
        column: String,
        data_type: String,
        message: String,
    },

    /// IO error (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        CopyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Decode error for one source column
    pub fn decode(column: impl Into<String>, data_type: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Decode {
            column: column.into(),
            data_type: data_type.into(),
            message: message.to_string(),
        }
    }

    /// Exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::Yaml(_) | CopyError::Json(_) => EXIT_CONFIG_ERROR,
            CopyError::SourceTableNotFound { .. } | CopyError::UnsupportedEnginePair { .. } => {
                EXIT_SOURCE_ERROR
            }
            CopyError::Mssql(_) | CopyError::Mysql(_) | CopyError::Odbc(_) | CopyError::Pool { .. } => {
                EXIT_DATABASE_ERROR
            }
            CopyError::ExtractionTimeout { .. } | CopyError::ExtractionProcessFailed { .. } => {
                EXIT_EXTRACTION_ERROR
            }
            CopyError::LoadTimeout { .. }
            | CopyError::LoadProcessFailed { .. }
            | CopyError::RemoteHostKeyUnverified { .. }
            | CopyError::RemoteFileMissing { .. }
            | CopyError::LoadIncomplete { .. } => EXIT_LOAD_ERROR,
            CopyError::Transfer { .. } | CopyError::Decode { .. } => EXIT_TRANSFER_ERROR,
            CopyError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_pair_message_names_engines() {
        let err = CopyError::UnsupportedEnginePair {
            source_engine: EngineKind::Netezza,
            dest_engine: EngineKind::Mysql,
        };
        assert_eq!(
            err.to_string(),
            "Copying from netezza to mysql is not implemented"
        );
        assert_eq!(err.exit_code(), EXIT_SOURCE_ERROR);
    }

    #[test]
    fn test_load_failures_share_exit_code() {
        let errs = [
            CopyError::RemoteHostKeyUnverified {
                table: "t".into(),
                output: String::new(),
            },
            CopyError::RemoteFileMissing {
                table: "t".into(),
                output: String::new(),
            },
            CopyError::LoadIncomplete {
                table: "t".into(),
                output: String::new(),
            },
        ];
        for err in errs {
            assert_eq!(err.exit_code(), EXIT_LOAD_ERROR);
        }
    }

    #[test]
    fn test_decode_error_names_column() {
        let err = CopyError::decode("hits", "int unsigned", "mismatched types");
        assert_eq!(
            err.to_string(),
            "Cannot read column hits (int unsigned): mismatched types"
        );
        assert_eq!(err.exit_code(), EXIT_TRANSFER_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CopyError::Io(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing"));
    }
}
