//! Bulk export of a source table to a delimited flat file with `bcp`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{BcpConfig, EndpointConfig};
use crate::core::identifier::quote_mssql;
use crate::core::schema::{ColumnDescriptor, ExternalProcessResult};
use crate::core::traits::DataUtils;
use crate::error::{CopyError, Result};

use super::process::{ProcessInvocation, ProcessRunner};

/// Longest query passed to the export tool on its command line.
pub const MAX_QUERY_LENGTH: usize = 3800;

/// Prefix for views created when the projection is too long.
pub const VIEW_PREFIX: &str = "CTVW";

/// Text bcp prints for a failed operation, sometimes with exit code 0.
const BCP_ERROR_SIGNATURE: &str = "Error = [";

/// How bcp authenticates against the source.
#[derive(Clone, PartialEq, Eq)]
pub enum BcpAuth {
    Trusted,
    Login { user: String, password: String },
}

impl std::fmt::Debug for BcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BcpAuth::Trusted => f.write_str("Trusted"),
            BcpAuth::Login { user, .. } => f
                .debug_struct("Login")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Resolved export settings.
#[derive(Debug, Clone)]
pub struct BcpSettings {
    pub program: String,
    pub server: String,
    pub staging_dir: PathBuf,
    pub auth: BcpAuth,
}

impl BcpSettings {
    /// Combine the bcp section with the source endpoint's host and login.
    pub fn from_config(bcp: &BcpConfig, source: &EndpointConfig) -> Self {
        let server = bcp.server.clone().unwrap_or_else(|| {
            if source.port() == 1433 {
                source.host.clone()
            } else {
                format!("{},{}", source.host, source.port())
            }
        });
        let auth = if bcp.trusted {
            BcpAuth::Trusted
        } else {
            BcpAuth::Login {
                user: source.user.clone(),
                password: source.password.clone(),
            }
        };
        Self {
            program: bcp.program.clone(),
            server,
            staging_dir: bcp.staging_dir.clone(),
            auth,
        }
    }
}

/// `SELECT <projections> FROM [db]..[table]`.
pub fn build_extract_query(catalog: &[ColumnDescriptor], source_database: &str, source_table: &str) -> Result<String> {
    let projections = catalog
        .iter()
        .map(|c| c.projection_expression.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "SELECT {} FROM {}..{}",
        projections,
        quote_mssql(source_database)?,
        quote_mssql(source_table)?
    ))
}

/// Staged file location: `<staging>/<source database>/<dest table>.txt`.
pub fn staged_file_path(staging_dir: &Path, source_database: &str, dest_table: &str) -> PathBuf {
    staging_dir
        .join(source_database)
        .join(format!("{}.txt", dest_table))
}

/// Build the bcp command line for `query`.
pub fn build_invocation(settings: &BcpSettings, query: &str, output: &Path) -> ProcessInvocation {
    let inv = ProcessInvocation::new(&settings.program)
        .arg(query)
        .arg("queryout")
        .arg(output.to_string_lossy())
        .args(["-c", "-t|", "-r\\n", "-S"])
        .arg(&settings.server);
    match &settings.auth {
        BcpAuth::Trusted => inv.arg("-T"),
        BcpAuth::Login { user, password } => inv.arg("-U").arg(user).arg("-P").secret_arg(password),
    }
}

/// Turn a finished export into success or a typed failure.
pub fn classify_extract_output(
    invocation: &ProcessInvocation,
    table: &str,
    timeout_secs: u64,
    result: &ExternalProcessResult,
) -> Result<()> {
    let output = invocation.mask(&result.combined);
    if result.timed_out {
        return Err(CopyError::ExtractionTimeout {
            table: table.to_string(),
            timeout_secs,
            output,
        });
    }
    if result.exit_code != Some(0) || result.combined.contains(BCP_ERROR_SIGNATURE) {
        return Err(CopyError::ExtractionProcessFailed {
            table: table.to_string(),
            exit_code: result.exit_code,
            output,
        });
    }
    Ok(())
}

/// Exports a source table through bcp.
pub struct BulkExtractor<'a> {
    source: &'a dyn DataUtils,
    runner: &'a dyn ProcessRunner,
    settings: &'a BcpSettings,
}

impl<'a> BulkExtractor<'a> {
    pub fn new(source: &'a dyn DataUtils, runner: &'a dyn ProcessRunner, settings: &'a BcpSettings) -> Self {
        Self {
            source,
            runner,
            settings,
        }
    }

    /// Export `source_table` and return the staged file path.
    pub async fn extract(
        &self,
        catalog: &[ColumnDescriptor],
        source_database: &str,
        source_table: &str,
        dest_table: &str,
        timeout_secs: u64,
    ) -> Result<PathBuf> {
        let mut query = build_extract_query(catalog, source_database, source_table)?;

        if query.len() > MAX_QUERY_LENGTH {
            let view = format!("{}{}", VIEW_PREFIX, source_table);
            info!(
                "{}: export query is {} characters, extracting through view {}",
                source_table,
                query.len(),
                view
            );
            self.source
                .create_or_replace_view(source_database, &view, &query)
                .await?;
            query = format!(
                "SELECT * FROM {}..{}",
                quote_mssql(source_database)?,
                quote_mssql(&view)?
            );
        }

        let path = staged_file_path(&self.settings.staging_dir, source_database, dest_table);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let invocation = build_invocation(self.settings, &query, &path);
        info!("Extracting {}.{} to {}", source_database, source_table, path.display());
        debug!("bcp invocation: {}", invocation);

        let result = self
            .runner
            .run(&invocation, Duration::from_secs(timeout_secs))
            .await?;

        if let Err(e) = classify_extract_output(&invocation, source_table, timeout_secs, &result) {
            warn!("Extraction of {} failed: {}", source_table, e);
            return Err(e);
        }

        info!("Extracted {} to {}", source_table, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{EngineKind, SourceColumn};
    use crate::datacopy::catalog::{CatalogBuilder, ShorteningRules};
    use crate::datacopy::process::MASK;
    use crate::testing::{Call, RecordingDataUtils, ScriptedRunner};
    use crate::typemap::TypeMapperCatalog;

    fn settings(dir: &Path) -> BcpSettings {
        BcpSettings {
            program: "bcp".into(),
            server: "sql01".into(),
            staging_dir: dir.to_path_buf(),
            auth: BcpAuth::Login {
                user: "relay".into(),
                password: "hunter2".into(),
            },
        }
    }

    fn catalog(columns: &[SourceColumn]) -> Vec<ColumnDescriptor> {
        CatalogBuilder::new(
            EngineKind::Mssql,
            EngineKind::Netezza,
            TypeMapperCatalog::with_builtins(),
            ShorteningRules::default(),
        )
        .describe_columns("t", columns)
    }

    #[test]
    fn test_invocation_arguments() {
        let s = settings(Path::new("/stage"));
        let inv = build_invocation(&s, "SELECT 1", Path::new("/stage/Sales/Orders.txt"));
        assert_eq!(inv.program, "bcp");
        assert_eq!(
            inv.args,
            vec![
                "SELECT 1", "queryout", "/stage/Sales/Orders.txt", "-c", "-t|", "-r\\n", "-S",
                "sql01", "-U", "relay", "-P", "hunter2",
            ]
        );
        assert!(!inv.to_string().contains("hunter2"));
    }

    #[test]
    fn test_trusted_invocation() {
        let mut s = settings(Path::new("/stage"));
        s.auth = BcpAuth::Trusted;
        let inv = build_invocation(&s, "SELECT 1", Path::new("/x.txt"));
        assert_eq!(inv.args.last().map(String::as_str), Some("-T"));
        assert!(!inv.args.iter().any(|a| a == "-P"));
    }

    #[test]
    fn test_server_defaults_to_source_host() {
        let bcp = BcpConfig {
            program: "bcp".into(),
            server: None,
            staging_dir: "/stage".into(),
            trusted: false,
        };
        let mut source: EndpointConfig = serde_yaml::from_str(
            "type: mssql\nhost: sql01\nuser: relay\npassword: pw\n",
        )
        .unwrap();
        assert_eq!(BcpSettings::from_config(&bcp, &source).server, "sql01");
        source.port = Some(14330);
        assert_eq!(BcpSettings::from_config(&bcp, &source).server, "sql01,14330");
        assert!(!format!("{:?}", BcpSettings::from_config(&bcp, &source)).contains("pw\""));
    }

    #[test]
    fn test_classify_error_signature_with_zero_exit() {
        let inv = build_invocation(&settings(Path::new("/s")), "SELECT 1", Path::new("/s/x.txt"));
        let result = ExternalProcessResult {
            exit_code: Some(0),
            combined: "SQLState = 28000, NativeError = 18456\nError = [Microsoft] Login failed for 'relay' using hunter2\n".into(),
            ..Default::default()
        };
        let err = classify_extract_output(&inv, "Orders", 60, &result).unwrap_err();
        match err {
            CopyError::ExtractionProcessFailed { output, exit_code, .. } => {
                assert_eq!(exit_code, Some(0));
                assert!(output.contains(MASK));
                assert!(!output.contains("hunter2"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_classify_timeout_and_exit() {
        let inv = ProcessInvocation::new("bcp");
        let timed_out = ExternalProcessResult {
            timed_out: true,
            combined: "1000 rows sent\n".into(),
            ..Default::default()
        };
        assert!(matches!(
            classify_extract_output(&inv, "Orders", 5, &timed_out),
            Err(CopyError::ExtractionTimeout { timeout_secs: 5, ref output, .. }) if output.contains("1000 rows")
        ));

        let failed = ExternalProcessResult {
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            classify_extract_output(&inv, "Orders", 5, &failed),
            Err(CopyError::ExtractionProcessFailed { exit_code: Some(1), .. })
        ));

        let ok = ExternalProcessResult {
            exit_code: Some(0),
            combined: "3 rows copied.\n".into(),
            ..Default::default()
        };
        assert!(classify_extract_output(&inv, "Orders", 5, &ok).is_ok());
    }

    #[tokio::test]
    async fn test_short_query_creates_no_view() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let source = RecordingDataUtils::new(EngineKind::Mssql);
        let runner = ScriptedRunner::new().push_ok("3 rows copied.\n");
        let cat = catalog(&[SourceColumn::new("Id", "int"), SourceColumn::new("Note", "varchar").with_length(20)]);

        let path = BulkExtractor::new(&source, &runner, &s)
            .extract(&cat, "Sales", "Orders", "ORDERS_NZ", 60)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("Sales").join("ORDERS_NZ.txt"));
        assert!(dir.path().join("Sales").is_dir());
        assert!(source.calls().is_empty());
        let inv = &runner.invocations()[0];
        assert!(inv.args[0].starts_with("SELECT [Id], "));
        assert!(inv.args[0].ends_with(" FROM [Sales]..[Orders]"));
    }

    #[tokio::test]
    async fn test_long_query_goes_through_view() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let source = RecordingDataUtils::new(EngineKind::Mssql);
        let runner = ScriptedRunner::new().push_ok("10 rows copied.\n");
        let columns: Vec<SourceColumn> = (0..20)
            .map(|i| SourceColumn::new(format!("Comment{}", i), "nvarchar").with_length(200))
            .collect();
        let cat = catalog(&columns);
        assert!(build_extract_query(&cat, "Sales", "Wide").unwrap().len() > MAX_QUERY_LENGTH);

        BulkExtractor::new(&source, &runner, &s)
            .extract(&cat, "Sales", "Wide", "Wide", 60)
            .await
            .unwrap();

        let calls = source.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::CreateView { database, view, query } => {
                assert_eq!(database, "Sales");
                assert_eq!(view, "CTVWWide");
                assert!(query.starts_with("SELECT "));
            }
            other => panic!("unexpected call: {:?}", other),
        }
        assert_eq!(runner.invocations()[0].args[0], "SELECT * FROM [Sales]..[CTVWWide]");
    }

    #[tokio::test]
    async fn test_failure_output_is_masked() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let source = RecordingDataUtils::new(EngineKind::Mssql);
        let runner = ScriptedRunner::new().push(ExternalProcessResult {
            exit_code: Some(1),
            combined: "bad password hunter2\n".into(),
            ..Default::default()
        });
        let cat = catalog(&[SourceColumn::new("Id", "int")]);

        let err = BulkExtractor::new(&source, &runner, &s)
            .extract(&cat, "Sales", "Orders", "Orders", 60)
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
        assert!(!err.format_detailed().contains("hunter2"));
    }
}
