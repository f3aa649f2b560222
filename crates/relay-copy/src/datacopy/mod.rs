//! Table copy strategies.
//!
//! A [`CopyStrategy`] is selected once per (source, destination) engine pair
//! and then serves any number of copy requests:
//!
//! - `copy_table_definition`: build the column catalog and recreate the
//!   destination table from it
//! - `copy_table`: the above, then move the rows, either through a staged
//!   flat file and a remote load (Netezza) or in-process (MSSQL destinations)
//!
//! ```rust,ignore
//! let strategy = CopyStrategy::select(
//!     EngineKind::Mssql, EngineKind::Netezza, source, dest, runner, &settings)?;
//! let spec = CopySpec::new(EngineKind::Mssql, "Sales", "Orders", EngineKind::Netezza, "DW");
//! let report = strategy.copy_table(&spec).await?;
//! ```

pub mod catalog;
pub mod definition;
pub mod extract;
pub mod load;
pub mod process;
pub mod projection;
pub mod transfer;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::{Config, RemoteLoadConfig};
use crate::core::schema::{ColumnDescriptor, CopyReport, CopySpec, EngineKind};
use crate::core::traits::DataUtils;
use crate::error::{CopyError, Result};
use crate::typemap::TypeMapperCatalog;

pub use catalog::{CatalogBuilder, ShorteningRules};
pub use definition::DefinitionOptions;
pub use extract::{BcpAuth, BcpSettings, BulkExtractor};
pub use load::RemoteLoader;
pub use process::{ProcessInvocation, ProcessRunner, TokioProcessRunner};

/// Settings shared by every strategy, resolved from configuration.
#[derive(Debug, Clone)]
pub struct CopySettings {
    pub type_mapper: TypeMapperCatalog,
    pub rules: ShorteningRules,
    /// Trailing CREATE TABLE clause per destination engine.
    pub layouts: HashMap<EngineKind, String>,
    pub bcp: Option<BcpSettings>,
    pub remote_load: Option<RemoteLoadConfig>,
    pub batch_size: usize,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            type_mapper: TypeMapperCatalog::with_builtins(),
            rules: ShorteningRules::default(),
            layouts: HashMap::from([(EngineKind::Netezza, "DISTRIBUTE ON RANDOM".to_string())]),
            bcp: None,
            remote_load: None,
            batch_size: 10_000,
        }
    }
}

impl CopySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            type_mapper: TypeMapperCatalog::with_builtins().with_overrides(&config.copy.type_mappings),
            rules: ShorteningRules::new(config.copy.string_length, config.copy.column_overrides.clone()),
            layouts: config.copy.layout.clone(),
            bcp: config
                .bcp
                .as_ref()
                .map(|b| BcpSettings::from_config(b, &config.source)),
            remote_load: config.remote_load.clone(),
            batch_size: config.copy.batch_size,
        }
    }

    pub fn layout_clause(&self, engine: EngineKind) -> Option<&str> {
        self.layouts
            .get(&engine)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Collaborators and catalog rules for one engine pair.
struct CopyContext {
    source: Arc<dyn DataUtils>,
    dest: Arc<dyn DataUtils>,
    catalog: CatalogBuilder,
    definition: DefinitionOptions,
}

impl CopyContext {
    fn new(
        source_kind: EngineKind,
        dest_kind: EngineKind,
        source: Arc<dyn DataUtils>,
        dest: Arc<dyn DataUtils>,
        settings: &CopySettings,
    ) -> Self {
        Self {
            source,
            dest,
            catalog: CatalogBuilder::new(
                source_kind,
                dest_kind,
                settings.type_mapper.clone(),
                settings.rules.clone(),
            ),
            definition: DefinitionOptions {
                layout: settings.layout_clause(dest_kind).map(str::to_string),
                // Rows written in-process keep their NULLs
                keep_nullability: dest_kind == EngineKind::Mssql,
            },
        }
    }

    fn create_statement(&self, spec: &CopySpec, catalog: &[ColumnDescriptor]) -> Result<String> {
        definition::build_create_statement(
            self.catalog.dest_dialect(),
            &spec.dest_database,
            &spec.source_schema,
            &spec.dest_table,
            catalog,
            &self.definition,
        )
    }
}

/// Staged file plus secure-shell load.
pub struct NetezzaLoadCopy {
    context: CopyContext,
    runner: Arc<dyn ProcessRunner>,
    bcp: BcpSettings,
    remote: RemoteLoadConfig,
}

/// Rows streamed through this process into a TDS bulk insert.
pub struct DirectCopy {
    context: CopyContext,
    batch_size: usize,
}

/// Copy implementation for one supported engine pair.
pub enum CopyStrategy {
    MssqlToNetezza(NetezzaLoadCopy),
    MssqlToMssql(DirectCopy),
    MysqlToMssql(DirectCopy),
}

impl CopyStrategy {
    /// Pick the strategy for an engine pair.
    ///
    /// Unsupported pairs fail before either collaborator is used.
    pub fn select(
        source_kind: EngineKind,
        dest_kind: EngineKind,
        source: Arc<dyn DataUtils>,
        dest: Arc<dyn DataUtils>,
        runner: Arc<dyn ProcessRunner>,
        settings: &CopySettings,
    ) -> Result<Self> {
        if !Self::supports(source_kind, dest_kind) {
            return Err(CopyError::UnsupportedEnginePair {
                source_engine: source_kind,
                dest_engine: dest_kind,
            });
        }
        if source.engine() != source_kind || dest.engine() != dest_kind {
            return Err(CopyError::Config(format!(
                "collaborators are {} -> {} but {} -> {} was requested",
                source.engine(),
                dest.engine(),
                source_kind,
                dest_kind
            )));
        }

        let context = CopyContext::new(source_kind, dest_kind, source, dest, settings);
        let strategy = match (source_kind, dest_kind) {
            (EngineKind::Mssql, EngineKind::Netezza) => {
                let bcp = settings.bcp.clone().ok_or_else(|| {
                    CopyError::Config("bcp settings are required for netezza destinations".into())
                })?;
                let remote = settings.remote_load.clone().ok_or_else(|| {
                    CopyError::Config("remote_load settings are required for netezza destinations".into())
                })?;
                CopyStrategy::MssqlToNetezza(NetezzaLoadCopy {
                    context,
                    runner,
                    bcp,
                    remote,
                })
            }
            (EngineKind::Mssql, EngineKind::Mssql) => CopyStrategy::MssqlToMssql(DirectCopy {
                context,
                batch_size: settings.batch_size,
            }),
            _ => CopyStrategy::MysqlToMssql(DirectCopy {
                context,
                batch_size: settings.batch_size,
            }),
        };

        info!("Selected {} strategy", strategy.name());
        Ok(strategy)
    }

    /// Whether a strategy exists for this pair.
    pub fn supports(source_kind: EngineKind, dest_kind: EngineKind) -> bool {
        matches!(
            (source_kind, dest_kind),
            (EngineKind::Mssql, EngineKind::Netezza)
                | (EngineKind::Mssql, EngineKind::Mssql)
                | (EngineKind::Mysql, EngineKind::Mssql)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CopyStrategy::MssqlToNetezza(_) => "MssqlToNetezza",
            CopyStrategy::MssqlToMssql(_) => "MssqlToMssql",
            CopyStrategy::MysqlToMssql(_) => "MysqlToMssql",
        }
    }

    fn context(&self) -> &CopyContext {
        match self {
            CopyStrategy::MssqlToNetezza(s) => &s.context,
            CopyStrategy::MssqlToMssql(s) | CopyStrategy::MysqlToMssql(s) => &s.context,
        }
    }

    fn check_spec(&self, spec: &CopySpec) -> Result<()> {
        if self.context().catalog.engines() != (spec.source_engine, spec.dest_engine) {
            return Err(CopyError::Config(format!(
                "{} strategy cannot serve a {} -> {} request",
                self.name(),
                spec.source_engine,
                spec.dest_engine
            )));
        }
        Ok(())
    }

    /// Build the catalog and CREATE statement without touching the destination.
    pub async fn show_catalog(&self, spec: &CopySpec) -> Result<(Vec<ColumnDescriptor>, String)> {
        self.check_spec(spec)?;
        let context = self.context();
        let catalog = context
            .catalog
            .build_catalog(context.source.as_ref(), spec)
            .await?;
        let create = context.create_statement(spec, &catalog)?;
        Ok((catalog, create))
    }

    /// Recreate the destination table from the source table's catalog.
    pub async fn copy_table_definition(&self, spec: &CopySpec) -> Result<Vec<ColumnDescriptor>> {
        self.check_spec(spec)?;
        let context = self.context();
        let catalog = context
            .catalog
            .build_catalog(context.source.as_ref(), spec)
            .await?;

        definition::sync_definition(
            context.dest.as_ref(),
            context.catalog.dest_dialect(),
            &spec.dest_database,
            &spec.source_schema,
            &spec.dest_table,
            &catalog,
            &context.definition,
        )
        .await?;

        Ok(catalog)
    }

    /// Recreate the destination table and copy every row into it.
    pub async fn copy_table(&self, spec: &CopySpec) -> Result<CopyReport> {
        let start = Instant::now();
        let catalog = self.copy_table_definition(spec).await?;

        let (staged_file, rows_transferred) = match self {
            CopyStrategy::MssqlToNetezza(s) => {
                let path = BulkExtractor::new(s.context.source.as_ref(), s.runner.as_ref(), &s.bcp)
                    .extract(
                        &catalog,
                        &spec.source_database,
                        &spec.source_table,
                        &spec.dest_table,
                        spec.timeout_secs,
                    )
                    .await?;
                RemoteLoader::new(s.runner.as_ref(), &s.remote)
                    .load(
                        &spec.source_table,
                        &spec.dest_database,
                        &spec.dest_table,
                        spec.timeout_secs,
                    )
                    .await?;
                (Some(path.display().to_string()), None)
            }
            CopyStrategy::MssqlToMssql(s) | CopyStrategy::MysqlToMssql(s) => {
                let rows = transfer::transfer_rows(
                    s.context.source.as_ref(),
                    s.context.dest.as_ref(),
                    s.context.catalog.source_dialect(),
                    spec,
                    &catalog,
                    s.batch_size,
                )
                .await?;
                (None, Some(rows))
            }
        };

        let report = CopyReport {
            strategy: self.name().to_string(),
            table: spec.dest_table.clone(),
            columns: catalog.len(),
            staged_file,
            rows_transferred,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "Copied {}.{} to {}.{} in {:.1}s",
            spec.source_database,
            spec.source_table,
            spec.dest_database,
            spec.dest_table,
            report.duration_seconds
        );
        Ok(report)
    }
}
