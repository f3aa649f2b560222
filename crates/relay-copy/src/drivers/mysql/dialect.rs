//! MySQL SQL dialect.

use crate::core::traits::Dialect;

const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "BETWEEN", "BIGINT", "BINARY", "BLOB",
    "BOTH", "BY", "CALL", "CASCADE", "CASE", "CHANGE", "CHAR", "CHARACTER", "CHECK", "COLLATE",
    "COLUMN", "CONDITION", "CONSTRAINT", "CONTINUE", "CONVERT", "CREATE", "CROSS",
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "DATABASE",
    "DATABASES", "DEC", "DECIMAL", "DECLARE", "DEFAULT", "DELAYED", "DELETE", "DESC",
    "DESCRIBE", "DISTINCT", "DIV", "DOUBLE", "DROP", "DUAL", "EACH", "ELSE", "ELSEIF",
    "ENCLOSED", "ESCAPED", "EXISTS", "EXIT", "EXPLAIN", "FALSE", "FETCH", "FLOAT", "FOR",
    "FORCE", "FOREIGN", "FROM", "FULLTEXT", "GRANT", "GROUP", "GROUPS", "HAVING", "IF",
    "IGNORE", "IN", "INDEX", "INNER", "INSERT", "INT", "INTEGER", "INTERVAL", "INTO", "IS",
    "JOIN", "KEY", "KEYS", "KILL", "LEADING", "LEAVE", "LEFT", "LIKE", "LIMIT", "LINES", "LOAD",
    "LOCK", "LONG", "LOOP", "MATCH", "MOD", "NATURAL", "NOT", "NULL", "NUMERIC", "ON", "OPTION",
    "OR", "ORDER", "OUT", "OUTER", "PRECISION", "PRIMARY", "PROCEDURE", "RANGE", "READ", "REAL",
    "REFERENCES", "REGEXP", "RENAME", "REPEAT", "REPLACE", "REQUIRE", "RESTRICT", "RETURN",
    "REVOKE", "RIGHT", "RLIKE", "ROW", "ROWS", "SCHEMA", "SELECT", "SET", "SHOW", "SMALLINT",
    "SPATIAL", "SQL", "STARTING", "TABLE", "TERMINATED", "THEN", "TO", "TRAILING", "TRIGGER",
    "TRUE", "UNION", "UNIQUE", "UNLOCK", "UNSIGNED", "UPDATE", "USAGE", "USE", "USING",
    "VALUES", "VARCHAR", "WHEN", "WHERE", "WHILE", "WITH", "WRITE", "XOR",
];

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    /// MySQL databases are schemas; the schema argument is ignored.
    fn qualify_table(&self, database: &str, _schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(database), self.quote_ident(table))
    }

    fn string_literal(&self, value: &str) -> String {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('\'', "''")
            .replace('\r', "\\r")
            .replace('\n', "\\n");
        format!("'{}'", escaped)
    }

    fn cast_to_text(&self, expr: &str, _data_type: &str) -> String {
        format!("CAST({} AS CHAR)", expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let d = MysqlDialect::new();
        assert_eq!(d.quote_ident("users"), "`users`");
        assert_eq!(d.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn test_string_literal_escapes_backslash() {
        let d = MysqlDialect::new();
        assert_eq!(d.string_literal("\\"), "'\\\\'");
        assert_eq!(d.string_literal("\r\n"), "'\\r\\n'");
    }

    #[test]
    fn test_qualify_table_ignores_schema() {
        let d = MysqlDialect::new();
        assert_eq!(d.qualify_table("shop", "dbo", "orders"), "`shop`.`orders`");
    }
}
