//! MSSQL SQL dialect.

use crate::core::identifier::quote_literal;
use crate::core::traits::Dialect;

/// T-SQL reserved keywords.
const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "AUTHORIZATION", "BACKUP", "BEGIN",
    "BETWEEN", "BREAK", "BROWSE", "BULK", "BY", "CASCADE", "CASE", "CHECK", "CHECKPOINT",
    "CLOSE", "CLUSTERED", "COALESCE", "COLLATE", "COLUMN", "COMMIT", "COMPUTE", "CONSTRAINT",
    "CONTAINS", "CONTAINSTABLE", "CONTINUE", "CONVERT", "CREATE", "CROSS", "CURRENT",
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "DATABASE",
    "DBCC", "DEALLOCATE", "DECLARE", "DEFAULT", "DELETE", "DENY", "DESC", "DISK", "DISTINCT",
    "DISTRIBUTED", "DOUBLE", "DROP", "DUMP", "ELSE", "END", "ERRLVL", "ESCAPE", "EXCEPT", "EXEC",
    "EXECUTE", "EXISTS", "EXIT", "EXTERNAL", "FETCH", "FILE", "FILLFACTOR", "FOR", "FOREIGN",
    "FREETEXT", "FREETEXTTABLE", "FROM", "FULL", "FUNCTION", "GOTO", "GRANT", "GROUP", "HAVING",
    "HOLDLOCK", "IDENTITY", "IDENTITY_INSERT", "IDENTITYCOL", "IF", "IN", "INDEX", "INNER",
    "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "KEY", "KILL", "LEFT", "LIKE", "LINENO", "LOAD",
    "MERGE", "NATIONAL", "NOCHECK", "NONCLUSTERED", "NOT", "NULL", "NULLIF", "OF", "OFF",
    "OFFSETS", "ON", "OPEN", "OPENDATASOURCE", "OPENQUERY", "OPENROWSET", "OPENXML", "OPTION",
    "OR", "ORDER", "OUTER", "OVER", "PERCENT", "PIVOT", "PLAN", "PRECISION", "PRIMARY", "PRINT",
    "PROC", "PROCEDURE", "PUBLIC", "RAISERROR", "READ", "READTEXT", "RECONFIGURE", "REFERENCES",
    "REPLICATION", "RESTORE", "RESTRICT", "RETURN", "REVERT", "REVOKE", "RIGHT", "ROLLBACK",
    "ROWCOUNT", "ROWGUIDCOL", "RULE", "SAVE", "SCHEMA", "SECURITYAUDIT", "SELECT",
    "SESSION_USER", "SET", "SETUSER", "SHUTDOWN", "SOME", "STATISTICS", "SYSTEM_USER", "TABLE",
    "TABLESAMPLE", "TEXTSIZE", "THEN", "TO", "TOP", "TRAN", "TRANSACTION", "TRIGGER",
    "TRUNCATE", "TRY_CONVERT", "TSEQUAL", "UNION", "UNIQUE", "UNPIVOT", "UPDATE", "UPDATETEXT",
    "USE", "USER", "VALUES", "VARYING", "VIEW", "WAITFOR", "WHEN", "WHERE", "WHILE", "WITH",
    "WRITETEXT",
];

/// Types TDS row decoding does not turn into a string; in-process reads
/// fetch them through a text cast instead.
const TEXT_READ_TYPES: &[&str] = &["xml", "sql_variant", "hierarchyid", "geography", "geometry"];

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    /// Brackets cost nothing in T-SQL, so every column is quoted.
    fn escape_column_name(&self, name: &str) -> String {
        self.quote_ident(name)
    }

    fn qualify_table(&self, database: &str, schema: &str, table: &str) -> String {
        format!(
            "{}.{}.{}",
            self.quote_ident(database),
            self.quote_ident(schema),
            self.quote_ident(table)
        )
    }

    /// Unicode literal with CR and LF spliced in as `CHAR(13)` / `CHAR(10)`.
    fn string_literal(&self, value: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        for ch in value.chars() {
            match ch {
                '\r' | '\n' => {
                    if !current.is_empty() {
                        parts.push(format!("N{}", quote_literal(&current)));
                        current.clear();
                    }
                    parts.push(format!("CHAR({})", ch as u32));
                }
                _ => current.push(ch),
            }
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(format!("N{}", quote_literal(&current)));
        }
        parts.join(" + ")
    }

    fn cast_to_text(&self, expr: &str, data_type: &str) -> String {
        let target = match data_type.to_lowercase().as_str() {
            "nchar" | "nvarchar" | "ntext" | "xml" | "sql_variant" => "NVARCHAR(MAX)",
            _ => "VARCHAR(MAX)",
        };
        format!("CAST({} AS {})", expr, target)
    }

    fn read_expression(&self, quoted: &str, data_type: &str) -> String {
        if TEXT_READ_TYPES.contains(&data_type.to_lowercase().as_str()) {
            format!("{} AS {}", self.cast_to_text(quoted, data_type), quoted)
        } else {
            quoted.to_string()
        }
    }
}
