//! Recording fakes for the collaborator traits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::schema::{EngineKind, ExternalProcessResult, SourceColumn};
use crate::core::traits::DataUtils;
use crate::core::value::{Batch, SqlValue};
use crate::datacopy::process::{ProcessInvocation, ProcessRunner};
use crate::error::{CopyError, Result};

/// A side-effecting call made against [`RecordingDataUtils`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute { database: String, sql: String },
    Drop { database: String, table: String, existed: bool },
    CreateView { database: String, view: String, query: String },
    BulkInsert { database: String, table: String, rows: usize },
}

/// In-memory `DataUtils` that records every side effect.
///
/// `CREATE TABLE` statements register the table so a later drop reports it.
pub struct RecordingDataUtils {
    engine: EngineKind,
    columns: HashMap<String, Vec<SourceColumn>>,
    tables: Mutex<HashSet<String>>,
    rows: Option<Vec<Vec<SqlValue<'static>>>>,
    calls: Mutex<Vec<Call>>,
    inserted: Mutex<Vec<Vec<SqlValue<'static>>>>,
}

impl RecordingDataUtils {
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            columns: HashMap::new(),
            tables: Mutex::new(HashSet::new()),
            rows: None,
            calls: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, table: &str, columns: Vec<SourceColumn>) -> Self {
        self.columns.insert(table.to_lowercase(), columns);
        self
    }

    pub fn with_existing_table(self, table: &str) -> Self {
        self.tables.lock().unwrap().insert(table.to_lowercase());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<SqlValue<'static>>>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every row passed to `bulk_insert`, in order.
    pub fn inserted_rows(&self) -> Vec<Vec<SqlValue<'static>>> {
        self.inserted.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Last name segment of a CREATE TABLE target, without quoting.
fn created_table(sql: &str) -> Option<String> {
    let rest = sql.strip_prefix("CREATE TABLE ")?;
    let target = rest.split_whitespace().next()?;
    let last = target.rsplit('.').next()?;
    Some(
        last.trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '`')
            .to_lowercase(),
    )
}

#[async_trait]
impl DataUtils for RecordingDataUtils {
    fn engine(&self) -> EngineKind {
        self.engine
    }

    async fn get_columns(&self, _database: &str, table: &str, _schema: &str) -> Result<Vec<SourceColumn>> {
        Ok(self
            .columns
            .get(&table.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_non_query(&self, database: &str, sql: &str) -> Result<u64> {
        if let Some(table) = created_table(sql) {
            self.tables.lock().unwrap().insert(table);
        }
        self.record(Call::Execute {
            database: database.to_string(),
            sql: sql.to_string(),
        });
        Ok(0)
    }

    async fn drop_table_if_exists(&self, database: &str, table: &str, _schema: &str) -> Result<bool> {
        let existed = self.tables.lock().unwrap().remove(&table.to_lowercase());
        self.record(Call::Drop {
            database: database.to_string(),
            table: table.to_string(),
            existed,
        });
        Ok(existed)
    }

    async fn create_or_replace_view(&self, database: &str, view: &str, query: &str) -> Result<()> {
        self.record(Call::CreateView {
            database: database.to_string(),
            view: view.to_string(),
            query: query.to_string(),
        });
        Ok(())
    }

    fn read_rows(
        &self,
        _database: &str,
        _query: &str,
        _columns: &[SourceColumn],
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(64);
        match &self.rows {
            None => {
                let _ = tx.try_send(Err(CopyError::Config(format!(
                    "{} fake has no rows",
                    self.engine
                ))));
            }
            Some(rows) => {
                let chunks: Vec<Vec<Vec<SqlValue<'static>>>> =
                    rows.chunks(batch_size.max(1)).map(|c| c.to_vec()).collect();
                let last = chunks.len().saturating_sub(1);
                if chunks.is_empty() {
                    let _ = tx.try_send(Ok(Batch::default().mark_final()));
                }
                for (i, chunk) in chunks.into_iter().enumerate() {
                    let batch = Batch::new(chunk);
                    let batch = if i == last { batch.mark_final() } else { batch };
                    let _ = tx.try_send(Ok(batch));
                }
            }
        }
        rx
    }

    async fn bulk_insert(&self, database: &str, _schema: &str, table: &str, batch: Batch) -> Result<u64> {
        let rows = batch.len();
        self.inserted.lock().unwrap().extend(batch.rows);
        self.record(Call::BulkInsert {
            database: database.to_string(),
            table: table.to_string(),
            rows,
        });
        Ok(rows as u64)
    }
}

/// `ProcessRunner` returning queued results and recording invocations.
/// With an empty queue every run succeeds with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    results: Mutex<VecDeque<ExternalProcessResult>>,
    invocations: Mutex<Vec<ProcessInvocation>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, result: ExternalProcessResult) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    /// Queue a zero-exit result with `output` on stdout.
    pub fn push_ok(self, output: &str) -> Self {
        self.push(ExternalProcessResult {
            exit_code: Some(0),
            stdout: output.to_string(),
            combined: output.to_string(),
            ..Default::default()
        })
    }

    pub fn invocations(&self) -> Vec<ProcessInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: &ProcessInvocation, timeout: Duration) -> Result<ExternalProcessResult> {
        self.invocations.lock().unwrap().push(invocation.clone());
        self.timeouts.lock().unwrap().push(timeout);
        Ok(self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExternalProcessResult {
                exit_code: Some(0),
                ..Default::default()
            }))
    }
}
