//! Engine-neutral schema and request types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// Database product taking part in a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Mssql,
    Mysql,
    Netezza,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Mssql => "mssql",
            EngineKind::Mysql => "mysql",
            EngineKind::Netezza => "netezza",
        }
    }

    /// Widest string length the engine accepts for a bounded character column.
    pub fn max_string_length(&self) -> i32 {
        match self {
            EngineKind::Mssql => 4000,
            EngineKind::Mysql => 16383,
            EngineKind::Netezza => 16000,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => Ok(EngineKind::Mssql),
            "mysql" | "mariadb" => Ok(EngineKind::Mysql),
            "netezza" | "nz" => Ok(EngineKind::Netezza),
            other => Err(CopyError::Config(format!(
                "Unknown database type: '{}'. Supported types: mssql, mysql, netezza",
                other
            ))),
        }
    }
}

/// Coarse SQL classification of a native column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlKind {
    /// char, varchar, nchar, nvarchar
    Character,
    /// text, ntext, xml and other unbounded character types
    LongText,
    /// binary, varbinary
    Binary,
    /// decimal, numeric
    Decimal,
    Other,
}

impl SqlKind {
    pub fn classify(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "char" | "varchar" | "nchar" | "nvarchar" | "character" | "character varying"
            | "national character" | "national character varying" => SqlKind::Character,
            "text" | "ntext" | "xml" | "tinytext" | "mediumtext" | "longtext" => SqlKind::LongText,
            "binary" | "varbinary" => SqlKind::Binary,
            "decimal" | "numeric" => SqlKind::Decimal,
            _ => SqlKind::Other,
        }
    }

    /// Types whose values need delimiter escaping in a flat-file export.
    pub fn is_string(&self) -> bool {
        matches!(self, SqlKind::Character | SqlKind::LongText)
    }
}

/// Column metadata as reported by a data-access collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceColumn {
    pub name: String,
    pub data_type: String,
    pub kind: SqlKind,
    /// Declared character length; `-1` for max, `0` when not applicable.
    pub max_length: i32,
    pub precision: i32,
    pub scale: i32,
    pub is_nullable: bool,
    pub ordinal_pos: i32,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            kind: SqlKind::classify(&data_type),
            data_type,
            max_length: 0,
            precision: 0,
            scale: 0,
            is_nullable: true,
            ordinal_pos: 0,
        }
    }

    pub fn with_length(mut self, max_length: i32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// Declared length of an unbounded MSSQL column.
pub const MAX_LENGTH: i32 = -1;

/// One destination column in a copy catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    /// Destination column name, reserved-word escaped.
    pub name: String,
    /// Column name as it appears on the source.
    pub source_name: String,
    pub source_type_name: String,
    pub dest_type_name: String,
    pub is_shortened_string_type: bool,
    pub is_shortened_numeric_type: bool,
    /// Declared length; [`MAX_LENGTH`] renders as `(max)`.
    pub declared_length: Option<i32>,
    pub declared_precision: Option<i32>,
    /// Only set for destinations that store the scale with the value.
    pub declared_scale: Option<i32>,
    pub projection_expression: String,
    /// Source nullability. Only emitted by `nullable_definition`.
    pub source_nullable: bool,
}

impl ColumnDescriptor {
    /// Full destination type including any length or precision annotation.
    pub fn dest_type(&self) -> String {
        match (self.declared_length, self.declared_precision, self.declared_scale) {
            (Some(MAX_LENGTH), _, _) => format!("{}(max)", self.dest_type_name),
            (Some(len), _, _) => format!("{}({})", self.dest_type_name, len),
            (None, Some(precision), Some(scale)) => {
                format!("{}({},{})", self.dest_type_name, precision, scale)
            }
            (None, Some(precision), None) => format!("{}({})", self.dest_type_name, precision),
            (None, None, _) => self.dest_type_name.clone(),
        }
    }

    /// Scale of the destination decimal column, from the declared scale or
    /// from a rewritten type such as `decimal(19,4)`.
    pub fn value_scale(&self) -> Option<u32> {
        if let Some(scale) = self.declared_scale {
            return u32::try_from(scale).ok();
        }
        let lower = self.dest_type_name.to_lowercase();
        let args = lower
            .strip_prefix("decimal(")
            .or_else(|| lower.strip_prefix("numeric("))?
            .strip_suffix(')')?;
        match args.split_once(',') {
            Some((_, scale)) => scale.trim().parse().ok(),
            None => Some(0),
        }
    }

    /// Widest value the destination column accepts, in the units the
    /// column is declared in. `None` for unbounded columns.
    pub fn length_limit(&self) -> Option<usize> {
        match self.declared_length {
            Some(len) if len > 0 => usize::try_from(len).ok(),
            _ => None,
        }
    }

    /// Whether the destination stores UTF-16 text (`nchar`, `nvarchar`).
    pub fn is_national_text(&self) -> bool {
        let lower = self.dest_type_name.to_lowercase();
        lower.starts_with("nchar") || lower.starts_with("nvarchar")
    }

    /// Column clause as it appears in CREATE TABLE.
    pub fn definition(&self) -> String {
        format!("{} {} NOT NULL", self.name, self.dest_type())
    }

    /// Column clause carrying the source column's nullability.
    pub fn nullable_definition(&self) -> String {
        if self.source_nullable {
            format!("{} {} NULL", self.name, self.dest_type())
        } else {
            self.definition()
        }
    }
}

/// Per-column length ceiling loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLengthOverride {
    pub table_name: String,
    pub column_name: String,
    pub override_length: i32,
}

/// A single table copy request.
#[derive(Debug, Clone, PartialEq)]
pub struct CopySpec {
    pub source_engine: EngineKind,
    pub source_database: String,
    pub source_schema: String,
    pub source_table: String,
    pub dest_engine: EngineKind,
    pub dest_database: String,
    pub dest_table: String,
    /// Logical table name used for configuration lookups.
    pub original_table_name: String,
    pub timeout_secs: u64,
}

impl CopySpec {
    /// Create a request copying `source_table` to a table of the same name.
    pub fn new(
        source_engine: EngineKind,
        source_database: impl Into<String>,
        source_table: impl Into<String>,
        dest_engine: EngineKind,
        dest_database: impl Into<String>,
    ) -> Self {
        let source_table = source_table.into();
        Self {
            source_engine,
            source_database: source_database.into(),
            source_schema: "dbo".to_string(),
            dest_table: source_table.clone(),
            original_table_name: source_table.clone(),
            source_table,
            dest_engine,
            dest_database: dest_database.into(),
            timeout_secs: 3600,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.source_schema = schema.into();
        self
    }

    pub fn with_dest_table(mut self, dest_table: Option<impl Into<String>>) -> Self {
        if let Some(t) = dest_table {
            self.dest_table = t.into();
        }
        self
    }

    pub fn with_original_table(mut self, original: Option<impl Into<String>>) -> Self {
        if let Some(t) = original {
            self.original_table_name = t.into();
        }
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Outcome of a spawned external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalProcessResult {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr interleaved in arrival order.
    pub combined: String,
    pub timed_out: bool,
}

impl ExternalProcessResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Summary of a completed copy.
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub strategy: String,
    pub table: String,
    pub columns: usize,
    pub staged_file: Option<String>,
    pub rows_transferred: Option<u64>,
    pub duration_seconds: f64,
}

impl CopyReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parse_aliases() {
        assert_eq!("SqlServer".parse::<EngineKind>().unwrap(), EngineKind::Mssql);
        assert_eq!("mariadb".parse::<EngineKind>().unwrap(), EngineKind::Mysql);
        assert_eq!("NZ".parse::<EngineKind>().unwrap(), EngineKind::Netezza);
        assert!("oracle".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_sql_kind_classify() {
        assert_eq!(SqlKind::classify("NVARCHAR"), SqlKind::Character);
        assert_eq!(SqlKind::classify("varbinary"), SqlKind::Binary);
        assert_eq!(SqlKind::classify("ntext"), SqlKind::LongText);
        assert_eq!(SqlKind::classify("numeric"), SqlKind::Decimal);
        assert_eq!(SqlKind::classify("int"), SqlKind::Other);
        assert!(SqlKind::LongText.is_string());
        assert!(!SqlKind::Binary.is_string());
    }

    #[test]
    fn test_descriptor_definition() {
        let col = ColumnDescriptor {
            name: "Note".into(),
            source_name: "Note".into(),
            source_type_name: "nvarchar".into(),
            dest_type_name: "nvarchar".into(),
            is_shortened_string_type: true,
            is_shortened_numeric_type: false,
            declared_length: Some(500),
            declared_precision: None,
            declared_scale: None,
            projection_expression: "[Note]".into(),
            source_nullable: true,
        };
        assert_eq!(col.definition(), "Note nvarchar(500) NOT NULL");
        assert_eq!(col.nullable_definition(), "Note nvarchar(500) NULL");
        assert_eq!(col.length_limit(), Some(500));
        assert!(col.is_national_text());
    }

    fn amount(dest_type_name: &str, precision: Option<i32>, scale: Option<i32>) -> ColumnDescriptor {
        ColumnDescriptor {
            name: "Amount".into(),
            source_name: "Amount".into(),
            source_type_name: "decimal".into(),
            dest_type_name: dest_type_name.into(),
            is_shortened_string_type: false,
            is_shortened_numeric_type: precision.is_some(),
            declared_length: None,
            declared_precision: precision,
            declared_scale: scale,
            projection_expression: "[Amount]".into(),
            source_nullable: false,
        }
    }

    #[test]
    fn test_decimal_scale_rendering() {
        assert_eq!(amount("decimal", Some(10), None).dest_type(), "decimal(10)");
        assert_eq!(amount("decimal", Some(10), Some(2)).dest_type(), "decimal(10,2)");
        assert_eq!(amount("decimal", Some(10), Some(2)).value_scale(), Some(2));
        assert_eq!(amount("decimal(19,4)", None, None).value_scale(), Some(4));
        assert_eq!(amount("NUMERIC(20)", None, None).value_scale(), Some(0));
        assert_eq!(amount("float", None, None).value_scale(), None);
    }

    #[test]
    fn test_max_length_rendering() {
        let mut col = amount("nvarchar", None, None);
        col.declared_length = Some(MAX_LENGTH);
        assert_eq!(col.dest_type(), "nvarchar(max)");
        assert_eq!(col.length_limit(), None);
    }

    #[test]
    fn test_copy_spec_defaults_to_source_table_name() {
        let spec = CopySpec::new(EngineKind::Mssql, "src", "Orders", EngineKind::Netezza, "DW")
            .with_dest_table(None::<String>)
            .with_original_table(Some("OrdersBase"));
        assert_eq!(spec.dest_table, "Orders");
        assert_eq!(spec.original_table_name, "OrdersBase");
        assert_eq!(spec.source_schema, "dbo");
    }

    #[test]
    fn test_process_result_success() {
        let mut result = ExternalProcessResult {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(result.success());
        result.timed_out = true;
        assert!(!result.success());
    }
}
