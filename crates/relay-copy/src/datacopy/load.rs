//! Remote load of a staged file through a secure-shell client.
//!
//! The load script on the appliance host reports through free text, so
//! the outcome is classified from markers in the captured output.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RemoteLoadConfig;
use crate::core::schema::ExternalProcessResult;
use crate::error::{CopyError, Result};

use super::process::{ProcessInvocation, ProcessRunner};

const HOST_KEY_MARKER: &str = "host key verification";
const FILE_MISSING_MARKERS: &[&str] = &["file not found", "no such file or directory"];

/// `<program> <extra args> -i <key> <user>@<host> <script> <db> <table>`.
pub fn build_invocation(config: &RemoteLoadConfig, dest_database: &str, dest_table: &str) -> ProcessInvocation {
    ProcessInvocation::new(&config.program)
        .args(config.extra_args.iter().cloned())
        .arg("-i")
        .arg(config.private_key_path.to_string_lossy())
        .arg(format!("{}@{}", config.user, config.host))
        .arg(&config.load_script)
        .arg(dest_database.to_lowercase())
        .arg(dest_table)
}

/// Classify a finished load. Output markers are checked before the exit
/// code because the client can exit 0 after refusing the connection.
pub fn classify_load_output(
    invocation: &ProcessInvocation,
    table: &str,
    completion_marker: &str,
    timeout_secs: u64,
    result: &ExternalProcessResult,
) -> Result<()> {
    let output = invocation.mask(&result.combined);
    if result.timed_out {
        return Err(CopyError::LoadTimeout {
            table: table.to_string(),
            timeout_secs,
            output,
        });
    }

    let lowered = result.combined.to_lowercase();
    if lowered.contains(HOST_KEY_MARKER) {
        return Err(CopyError::RemoteHostKeyUnverified {
            table: table.to_string(),
            output,
        });
    }
    if FILE_MISSING_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(CopyError::RemoteFileMissing {
            table: table.to_string(),
            output,
        });
    }
    if result.exit_code != Some(0) {
        return Err(CopyError::LoadProcessFailed {
            table: table.to_string(),
            exit_code: result.exit_code,
            output,
        });
    }
    if !lowered.contains(&completion_marker.to_lowercase()) {
        return Err(CopyError::LoadIncomplete {
            table: table.to_string(),
            output,
        });
    }
    Ok(())
}

/// Runs the remote load script for one table.
pub struct RemoteLoader<'a> {
    runner: &'a dyn ProcessRunner,
    config: &'a RemoteLoadConfig,
}

impl<'a> RemoteLoader<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, config: &'a RemoteLoadConfig) -> Self {
        Self { runner, config }
    }

    pub async fn load(&self, source_table: &str, dest_database: &str, dest_table: &str, timeout_secs: u64) -> Result<()> {
        let invocation = build_invocation(self.config, dest_database, dest_table);
        info!(
            "Loading {} into {}.{} on {}",
            source_table, dest_database, dest_table, self.config.host
        );
        debug!("load invocation: {}", invocation);

        let result = self
            .runner
            .run(&invocation, Duration::from_secs(timeout_secs))
            .await?;

        if let Err(e) = classify_load_output(
            &invocation,
            source_table,
            &self.config.completion_marker,
            timeout_secs,
            &result,
        ) {
            warn!("Load of {} failed: {}", source_table, e);
            return Err(e);
        }

        info!("Loaded {} into {}.{}", source_table, dest_database, dest_table);
        Ok(())
    }
}
