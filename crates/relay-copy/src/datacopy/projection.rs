//! Export projection for delimited flat files.
//!
//! The staged file uses `|` between fields and LF between rows, with
//! backslash as the escape character the load side understands. String
//! columns are rewritten in SQL so no value can break that framing.

use crate::core::schema::SourceColumn;
use crate::core::traits::Dialect;

/// Field separator written by the export.
pub const FIELD_SEPARATOR: &str = "|";

/// Token the load side reads as SQL NULL.
pub const NULL_TOKEN: &str = "NULL";

/// Escape steps applied innermost first. Order matters: backslashes are
/// doubled before any step introduces new ones.
const ESCAPE_STEPS: &[(&str, &str)] = &[
    ("\\", "\\\\"),
    ("\r\n", "\n"),
    ("\n", "\\\n"),
    ("\"", "\\\""),
    (FIELD_SEPARATOR, "\\|"),
];

/// Wrap `expr` in the nested replacements that neutralize framing characters.
pub fn escape_expression(dialect: &dyn Dialect, expr: &str) -> String {
    let escaped = ESCAPE_STEPS
        .iter()
        .fold(expr.to_string(), |acc, (from, to)| dialect.replace(&acc, from, to));
    dialect.replace_whole(&escaped, NULL_TOKEN, "\\NULL")
}

/// Select-list entry for one column.
pub fn projection_expression(dialect: &dyn Dialect, column: &SourceColumn) -> String {
    let quoted = dialect.quote_ident(&column.name);
    if !column.kind.is_string() {
        return quoted;
    }
    let text = dialect.cast_to_text(&quoted, &column.data_type);
    format!("{} AS {}", escape_expression(dialect, &text), quoted)
}
