//! Configuration validation.

use super::{Config, EndpointConfig};
use crate::core::schema::EngineKind;
use crate::datacopy::CopyStrategy;
use crate::error::{CopyError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("source", &config.source)?;
    validate_endpoint("destination", &config.destination)?;

    let (source, dest) = (config.source.r#type, config.destination.r#type);
    if !CopyStrategy::supports(source, dest) {
        return Err(CopyError::Config(format!(
            "copying from {} to {} is not supported",
            source, dest
        )));
    }

    if config.source.host == config.destination.host
        && config.source.port() == config.destination.port()
        && config.source.r#type == config.destination.r#type
        && !config.source.database.is_empty()
        && config.source.database == config.destination.database
    {
        return Err(CopyError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    if let Some(len) = config.copy.string_length {
        if len <= 0 {
            return Err(CopyError::Config(format!(
                "copy.string_length must be positive, got {}",
                len
            )));
        }
    }

    for o in &config.copy.column_overrides {
        if o.table_name.is_empty() || o.column_name.is_empty() {
            return Err(CopyError::Config(
                "copy.column_overrides entries need table_name and column_name".into(),
            ));
        }
        if o.override_length <= 0 {
            return Err(CopyError::Config(format!(
                "copy.column_overrides: length for {}.{} must be positive, got {}",
                o.table_name, o.column_name, o.override_length
            )));
        }
    }

    if config.copy.timeout_seconds == 0 {
        return Err(CopyError::Config(
            "copy.timeout_seconds must be at least 1".into(),
        ));
    }
    if config.copy.batch_size == 0 {
        return Err(CopyError::Config("copy.batch_size must be at least 1".into()));
    }

    if config.destination.r#type == EngineKind::Netezza {
        let remote = config.remote_load.as_ref().ok_or_else(|| {
            CopyError::Config("remote_load is required for netezza destinations".into())
        })?;
        if remote.host.is_empty() || remote.user.is_empty() {
            return Err(CopyError::Config(
                "remote_load.host and remote_load.user are required".into(),
            ));
        }
        if remote.load_script.is_empty() {
            return Err(CopyError::Config("remote_load.load_script is required".into()));
        }
        if remote.completion_marker.is_empty() {
            return Err(CopyError::Config(
                "remote_load.completion_marker cannot be empty".into(),
            ));
        }

        let bcp = config.bcp.as_ref().ok_or_else(|| {
            CopyError::Config("bcp is required when copying from mssql to netezza".into())
        })?;
        if bcp.staging_dir.as_os_str().is_empty() {
            return Err(CopyError::Config("bcp.staging_dir is required".into()));
        }
    }

    Ok(())
}

fn validate_endpoint(section: &str, endpoint: &EndpointConfig) -> Result<()> {
    if endpoint.host.is_empty() {
        return Err(CopyError::Config(format!("{}.host is required", section)));
    }
    if endpoint.user.is_empty() {
        return Err(CopyError::Config(format!("{}.user is required", section)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BcpConfig, CopyConfig, RemoteLoadConfig};
    use crate::core::schema::ColumnLengthOverride;

    fn endpoint(kind: EngineKind, host: &str) -> EndpointConfig {
        EndpointConfig {
            r#type: kind,
            host: host.to_string(),
            port: None,
            database: String::new(),
            user: "relay".to_string(),
            password: "password".to_string(),
            encrypt: true,
            trust_server_cert: false,
            driver: "NetezzaSQL".to_string(),
        }
    }

    fn valid_config() -> Config {
        Config {
            source: endpoint(EngineKind::Mssql, "sql01"),
            destination: endpoint(EngineKind::Netezza, "nz01"),
            copy: CopyConfig::default(),
            bcp: Some(BcpConfig {
                program: "bcp".into(),
                server: None,
                staging_dir: "/mnt/sql_temp".into(),
                trusted: false,
            }),
            remote_load: Some(RemoteLoadConfig {
                program: "plink".into(),
                extra_args: vec!["-batch".into()],
                user: "nz".into(),
                private_key_path: "/keys/nz.ppk".into(),
                host: "nzhost".into(),
                load_script: "/export/home/nz/load.sh".into(),
                completion_marker: "completed successfully".into(),
            }),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unsupported_pair_rejected() {
        let mut config = valid_config();
        config.source.r#type = EngineKind::Netezza;
        config.destination.r#type = EngineKind::Mysql;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("netezza to mysql"));
    }

    #[test]
    fn test_pairs_follow_strategies() {
        let kinds = [EngineKind::Mssql, EngineKind::Mysql, EngineKind::Netezza];
        for source in kinds {
            for dest in kinds {
                let mut config = valid_config();
                config.source.r#type = source;
                config.destination.r#type = dest;
                config.destination.host = "other01".into();
                let rejected = matches!(
                    validate(&config),
                    Err(CopyError::Config(ref m)) if m.contains("is not supported")
                );
                assert_eq!(
                    rejected,
                    !CopyStrategy::supports(source, dest),
                    "{} -> {}",
                    source,
                    dest
                );
            }
        }
    }

    #[test]
    fn test_mysql_to_mssql_needs_no_remote_load() {
        let mut config = valid_config();
        config.source.r#type = EngineKind::Mysql;
        config.destination.r#type = EngineKind::Mssql;
        config.remote_load = None;
        config.bcp = None;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_netezza_requires_bcp() {
        let mut config = valid_config();
        config.bcp = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_non_positive_lengths_rejected() {
        let mut config = valid_config();
        config.copy.string_length = Some(0);
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.copy.column_overrides.push(ColumnLengthOverride {
            table_name: "Orders".into(),
            column_name: "Note".into(),
            override_length: -5,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.destination = endpoint(EngineKind::Mssql, "sql01");
        config.source.database = "sales".into();
        config.destination.database = "sales".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_endpoint_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
