//! Type mapping between engine type systems.
//!
//! Each supported (source, destination) pair owns a static rewrite table.
//! A lookup that finds no rewrite returns the source type name unchanged,
//! which tells the catalog builder to apply its length and precision rules
//! to the native type instead.
//!
//! ```rust,ignore
//! let mapper = TypeMapperCatalog::with_builtins();
//! assert_eq!(mapper.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "bit"), "boolean");
//! assert_eq!(mapper.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "nvarchar"), "nvarchar");
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::schema::EngineKind;

/// MSSQL → Netezza rewrites.
///
/// Character and decimal types are absent on purpose: Netezza accepts the
/// same names, so they fall through to length annotation.
const MSSQL_TO_NETEZZA: &[(&str, &str)] = &[
    ("bit", "boolean"),
    ("tinyint", "smallint"),
    ("float", "double precision"),
    ("money", "numeric(19,4)"),
    ("smallmoney", "numeric(10,4)"),
    ("datetime", "timestamp"),
    ("datetime2", "timestamp"),
    ("smalldatetime", "timestamp"),
    ("datetimeoffset", "timestamp"),
    ("uniqueidentifier", "char(36)"),
    ("text", "varchar(64000)"),
    ("ntext", "nvarchar(16000)"),
    ("xml", "nvarchar(16000)"),
    ("image", "varchar(64000)"),
    ("sql_variant", "varchar(8000)"),
    ("hierarchyid", "varchar(4000)"),
    ("geography", "varchar(64000)"),
    ("geometry", "varchar(64000)"),
    ("timestamp", "char(16)"),
    ("rowversion", "char(16)"),
];

/// MySQL → MSSQL rewrites.
///
/// Unsigned integers arrive as `<type> unsigned` and widen to the next
/// signed type. Character types widen to their Unicode forms and keep
/// their length annotation.
const MYSQL_TO_MSSQL: &[(&str, &str)] = &[
    // MySQL tinyint is signed, MSSQL tinyint is not
    ("tinyint", "smallint"),
    ("tinyint unsigned", "smallint"),
    ("smallint unsigned", "int"),
    ("mediumint unsigned", "int"),
    ("int unsigned", "bigint"),
    ("bigint unsigned", "decimal(20,0)"),
    ("char", "nchar"),
    ("varchar", "nvarchar"),
    ("mediumint", "int"),
    ("integer", "int"),
    ("double", "float"),
    ("float", "real"),
    ("bool", "bit"),
    ("boolean", "bit"),
    ("datetime", "datetime2"),
    ("timestamp", "datetime2"),
    ("year", "smallint"),
    ("tinytext", "nvarchar(255)"),
    ("text", "nvarchar(max)"),
    ("mediumtext", "nvarchar(max)"),
    ("longtext", "nvarchar(max)"),
    ("json", "nvarchar(max)"),
    ("enum", "nvarchar(255)"),
    ("set", "nvarchar(255)"),
    ("tinyblob", "varbinary(255)"),
    ("blob", "varbinary(max)"),
    ("mediumblob", "varbinary(max)"),
    ("longblob", "varbinary(max)"),
];

/// MSSQL → MSSQL rewrites.
///
/// Only types the in-process bulk insert cannot write back verbatim are
/// rewritten; everything else copies with its native name.
const MSSQL_TO_MSSQL: &[(&str, &str)] = &[
    // Read as a 16-bit value, which TDS will not write into a tinyint
    ("tinyint", "smallint"),
    ("datetime", "datetime2"),
    ("smalldatetime", "datetime2"),
    ("money", "decimal(19,4)"),
    ("smallmoney", "decimal(10,4)"),
    ("text", "varchar(max)"),
    ("ntext", "nvarchar(max)"),
    ("xml", "nvarchar(max)"),
    ("image", "varbinary(max)"),
    ("timestamp", "binary(8)"),
    ("rowversion", "binary(8)"),
    ("sql_variant", "nvarchar(max)"),
    ("hierarchyid", "varchar(4000)"),
    ("geography", "varchar(max)"),
    ("geometry", "varchar(max)"),
];

/// A user-supplied rewrite loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMappingConfig {
    pub source: EngineKind,
    pub dest: EngineKind,
    pub from: String,
    pub to: String,
}

/// Registry of type rewrites keyed by (source, destination) engine pair.
#[derive(Debug, Clone, Default)]
pub struct TypeMapperCatalog {
    mappings: HashMap<(EngineKind, EngineKind), HashMap<String, String>>,
}

impl TypeMapperCatalog {
    /// Create an empty catalog. Every lookup is then an identity mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in rewrite tables registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register_table(EngineKind::Mssql, EngineKind::Mssql, MSSQL_TO_MSSQL);
        catalog.register_table(EngineKind::Mssql, EngineKind::Netezza, MSSQL_TO_NETEZZA);
        catalog.register_table(EngineKind::Mysql, EngineKind::Mssql, MYSQL_TO_MSSQL);
        catalog
    }

    /// Add configured rewrites on top of the existing tables.
    pub fn with_overrides(mut self, overrides: &[TypeMappingConfig]) -> Self {
        for m in overrides {
            self.register(m.source, m.dest, &m.from, &m.to);
        }
        self
    }

    pub fn register_table(&mut self, source: EngineKind, dest: EngineKind, table: &[(&str, &str)]) {
        for (from, to) in table {
            self.register(source, dest, from, to);
        }
    }

    /// Register a single rewrite, replacing any existing one.
    pub fn register(&mut self, source: EngineKind, dest: EngineKind, from: &str, to: &str) {
        self.mappings
            .entry((source, dest))
            .or_default()
            .insert(from.to_lowercase(), to.to_string());
    }

    /// Map a source type name into the destination's type system.
    ///
    /// Returns the input unchanged when no rewrite is defined.
    pub fn map_data_type(&self, source: EngineKind, dest: EngineKind, type_name: &str) -> String {
        match self
            .mappings
            .get(&(source, dest))
            .and_then(|m| m.get(&type_name.to_lowercase()))
        {
            Some(mapped) => {
                debug!("Mapped {} type {} to {} {}", source, type_name, dest, mapped);
                mapped.clone()
            }
            None => type_name.to_string(),
        }
    }

    /// Whether any rewrites are registered for this pair.
    pub fn has_pair(&self, source: EngineKind, dest: EngineKind) -> bool {
        self.mappings.contains_key(&(source, dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mssql_to_netezza_rewrites() {
        let m = TypeMapperCatalog::with_builtins();
        assert_eq!(m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "bit"), "boolean");
        assert_eq!(
            m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "DATETIME2"),
            "timestamp"
        );
        assert_eq!(
            m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "uniqueidentifier"),
            "char(36)"
        );
    }

    #[test]
    fn test_unmapped_type_returned_unchanged() {
        let m = TypeMapperCatalog::with_builtins();
        assert_eq!(
            m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "NVarChar"),
            "NVarChar"
        );
        assert_eq!(m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "int"), "int");
    }

    #[test]
    fn test_mssql_to_mssql_keeps_core_types() {
        let m = TypeMapperCatalog::with_builtins();
        for t in ["int", "bit", "nvarchar", "decimal", "uniqueidentifier"] {
            assert_eq!(m.map_data_type(EngineKind::Mssql, EngineKind::Mssql, t), t);
        }
        assert_eq!(
            m.map_data_type(EngineKind::Mssql, EngineKind::Mssql, "datetime"),
            "datetime2"
        );
        assert_eq!(m.map_data_type(EngineKind::Mssql, EngineKind::Mssql, "tinyint"), "smallint");
    }

    #[test]
    fn test_empty_catalog_is_identity() {
        let m = TypeMapperCatalog::new();
        assert!(!m.has_pair(EngineKind::Mssql, EngineKind::Netezza));
        assert_eq!(m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "bit"), "bit");
    }

    #[test]
    fn test_mysql_to_mssql_rewrites() {
        let m = TypeMapperCatalog::with_builtins();
        assert_eq!(m.map_data_type(EngineKind::Mysql, EngineKind::Mssql, "tinyint"), "smallint");
        assert_eq!(
            m.map_data_type(EngineKind::Mysql, EngineKind::Mssql, "longtext"),
            "nvarchar(max)"
        );
        assert_eq!(m.map_data_type(EngineKind::Mysql, EngineKind::Mssql, "varchar"), "nvarchar");
        assert_eq!(m.map_data_type(EngineKind::Mysql, EngineKind::Mssql, "INT UNSIGNED"), "bigint");
        assert_eq!(
            m.map_data_type(EngineKind::Mysql, EngineKind::Mssql, "bigint unsigned"),
            "decimal(20,0)"
        );
        assert_eq!(m.map_data_type(EngineKind::Mysql, EngineKind::Mssql, "int"), "int");
    }

    #[test]
    fn test_config_override_replaces_builtin() {
        let m = TypeMapperCatalog::with_builtins().with_overrides(&[TypeMappingConfig {
            source: EngineKind::Mssql,
            dest: EngineKind::Netezza,
            from: "XML".into(),
            to: "nvarchar(4000)".into(),
        }]);
        assert_eq!(
            m.map_data_type(EngineKind::Mssql, EngineKind::Netezza, "xml"),
            "nvarchar(4000)"
        );
    }
}
