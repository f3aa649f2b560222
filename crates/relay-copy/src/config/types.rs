//! Configuration type definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnLengthOverride, EngineKind};
use crate::typemap::TypeMappingConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine the table is read from.
    pub source: EndpointConfig,

    /// Engine the table is written to.
    pub destination: EndpointConfig,

    /// Copy behavior configuration.
    #[serde(default)]
    pub copy: CopyConfig,

    /// Bulk export tool settings (MSSQL → Netezza).
    #[serde(default)]
    pub bcp: Option<BcpConfig>,

    /// Secure-shell load settings (Netezza destinations).
    #[serde(default)]
    pub remote_load: Option<RemoteLoadConfig>,
}

/// Connection settings for one engine endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Engine kind: mssql, mysql or netezza.
    pub r#type: EngineKind,

    /// Database host.
    pub host: String,

    /// Database port (engine default when omitted).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database used for the initial connection.
    #[serde(default)]
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Encrypt the connection (MSSQL, MySQL).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate without validation.
    #[serde(default)]
    pub trust_server_cert: bool,

    /// ODBC driver name (Netezza).
    #[serde(default = "default_odbc_driver")]
    pub driver: String,
}

impl EndpointConfig {
    /// Port, falling back to the engine's well-known port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.r#type {
            EngineKind::Mssql => 1433,
            EngineKind::Mysql => 3306,
            EngineKind::Netezza => 5480,
        })
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("driver", &self.driver)
            .finish()
    }
}

/// Copy behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Engine-wide length for shortened string columns.
    #[serde(default)]
    pub string_length: Option<i32>,

    /// Per-column length ceilings keyed by (table, column).
    #[serde(default)]
    pub column_overrides: Vec<ColumnLengthOverride>,

    /// Extra type rewrites layered over the built-in tables.
    #[serde(default)]
    pub type_mappings: Vec<TypeMappingConfig>,

    /// CREATE TABLE trailing clause per destination engine.
    #[serde(default = "default_layout")]
    pub layout: HashMap<EngineKind, String>,

    /// Default timeout for a single copy (default: 3600).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Rows per batch for in-process copies (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            string_length: None,
            column_overrides: Vec::new(),
            type_mappings: Vec::new(),
            layout: default_layout(),
            timeout_seconds: default_timeout_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

/// Bulk export (bcp) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BcpConfig {
    /// Executable name or path (default: "bcp").
    #[serde(default = "default_bcp_program")]
    pub program: String,

    /// Server passed to -S (default: source host).
    #[serde(default)]
    pub server: Option<String>,

    /// Directory shared with the load host. Files land in `<dir>/<database>/`.
    pub staging_dir: PathBuf,

    /// Use a trusted connection (-T) instead of the source credentials.
    #[serde(default)]
    pub trusted: bool,
}

/// Secure-shell remote load settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLoadConfig {
    /// Executable name or path (default: "plink").
    #[serde(default = "default_ssh_program")]
    pub program: String,

    /// Arguments placed before the key and host (default: ["-batch"]).
    #[serde(default = "default_ssh_args")]
    pub extra_args: Vec<String>,

    /// Remote login.
    pub user: String,

    /// Private key file passed with -i.
    pub private_key_path: PathBuf,

    /// Host running the load script.
    pub host: String,

    /// Script invoked as `<script> <database> <table>`.
    pub load_script: String,

    /// Text the script prints when the load finished.
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
}

fn default_true() -> bool {
    true
}

fn default_odbc_driver() -> String {
    "NetezzaSQL".to_string()
}

fn default_layout() -> HashMap<EngineKind, String> {
    HashMap::from([(EngineKind::Netezza, "DISTRIBUTE ON RANDOM".to_string())])
}

fn default_timeout_seconds() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    10_000
}

fn default_bcp_program() -> String {
    "bcp".to_string()
}

fn default_ssh_program() -> String {
    "plink".to_string()
}

fn default_ssh_args() -> Vec<String> {
    vec!["-batch".to_string()]
}

fn default_completion_marker() -> String {
    "completed successfully".to_string()
}
