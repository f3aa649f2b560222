//! Netezza SQL dialect.

use crate::core::identifier::quote_literal;
use crate::core::traits::Dialect;

/// Netezza reserved keywords.
const RESERVED_WORDS: &[&str] = &[
    "ABORT", "ADMIN", "AGGREGATE", "ALIGN", "ALL", "ALLOCATE", "ANALYSE", "ANALYZE", "AND",
    "ANY", "AS", "ASC", "BETWEEN", "BINARY", "BIT", "BOTH", "CASE", "CAST", "CHAR", "CHARACTER",
    "CHECK", "CLUSTER", "COALESCE", "COLLATE", "COLLATION", "COLUMN", "CONSTRAINT", "COPY",
    "CROSS", "CURRENT", "CURRENT_CATALOG", "CURRENT_DATE", "CURRENT_DB", "CURRENT_SCHEMA",
    "CURRENT_SID", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURRENT_USERID",
    "CURRENT_USEROID", "DEALLOCATE", "DEC", "DECIMAL", "DECODE", "DEFAULT", "DEFERRABLE",
    "DESC", "DISTINCT", "DISTRIBUTE", "DO", "ELSE", "END", "EXCEPT", "EXCLUDE", "EXISTS",
    "EXPLAIN", "EXPRESS", "EXTEND", "EXTERNAL", "EXTRACT", "FALSE", "FIRST", "FLOAT",
    "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "FUNCTION", "GENSTATS", "GLOBAL", "GROUP",
    "HAVING", "IDENTIFIER_CASE", "ILIKE", "IN", "INDEX", "INITIALLY", "INNER", "INOUT",
    "INTERSECT", "INTERVAL", "INTO", "LAST", "LEADING", "LEFT", "LIKE", "LIMIT", "LOAD",
    "LOCAL", "LOCK", "MINUS", "MOVE", "NATURAL", "NCHAR", "NEW", "NOT", "NOTNULL", "NULL",
    "NULLS", "NUMERIC", "NVL", "NVL2", "OFF", "OFFSET", "OLD", "ON", "ONLINE", "ONLY", "OR",
    "ORDER", "OTHERS", "OUT", "OUTER", "OVER", "OVERLAPS", "PARTITION", "POSITION",
    "PRECEDING", "PRECISION", "PRESERVE", "PRIMARY", "RESET", "REUSE", "RIGHT", "ROWS",
    "SELECT", "SESSION_USER", "SETOF", "SHOW", "SOME", "TABLE", "THEN", "TIES", "TIME",
    "TIMESTAMP", "TO", "TRAILING", "TRANSACTION", "TRIGGER", "TRIM", "TRUE", "UNBOUNDED",
    "UNION", "UNIQUE", "USER", "USING", "VACUUM", "VARCHAR", "VERBOSE", "VERSION", "VIEW",
    "WHEN", "WHERE", "WITH", "WRITE",
];

/// Netezza dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct NetezzaDialect;

impl NetezzaDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for NetezzaDialect {
    fn name(&self) -> &str {
        "netezza"
    }

    /// Upper-cased and double-quoted, matching Netezza's folding of bare names.
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.to_uppercase().replace('"', "\"\""))
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    /// Connections are scoped to one database, so DDL names the table alone.
    fn qualify_table(&self, _database: &str, _schema: &str, table: &str) -> String {
        self.escape_column_name(table)
    }

    fn string_literal(&self, value: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        for ch in value.chars() {
            match ch {
                '\r' | '\n' => {
                    if !current.is_empty() {
                        parts.push(quote_literal(&current));
                        current.clear();
                    }
                    parts.push(format!("chr({})", ch as u32));
                }
                _ => current.push(ch),
            }
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(quote_literal(&current));
        }
        parts.join(" || ")
    }

    fn cast_to_text(&self, expr: &str, _data_type: &str) -> String {
        format!("CAST({} AS NVARCHAR(16000))", expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_column_quoted_upper() {
        let d = NetezzaDialect::new();
        assert_eq!(d.escape_column_name("position"), "\"POSITION\"");
        assert_eq!(d.escape_column_name("Amount"), "Amount");
    }

    #[test]
    fn test_irregular_column_quoted() {
        let d = NetezzaDialect::new();
        assert_eq!(d.escape_column_name("Order Date"), "\"ORDER DATE\"");
        assert_eq!(d.escape_column_name("1st_pass"), "\"1ST_PASS\"");
        assert_eq!(d.escape_column_name("Order_Date"), "Order_Date");
    }

    #[test]
    fn test_qualify_table_is_bare_name() {
        let d = NetezzaDialect::new();
        assert_eq!(d.qualify_table("DW", "dbo", "Orders"), "Orders");
        assert_eq!(d.qualify_table("DW", "dbo", "user"), "\"USER\"");
    }

    #[test]
    fn test_string_literal_uses_chr() {
        let d = NetezzaDialect::new();
        assert_eq!(d.string_literal("a\nb"), "'a' || chr(10) || 'b'");
    }
}
