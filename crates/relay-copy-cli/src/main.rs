//! relay-copy CLI - copy single tables between MSSQL, MySQL and Netezza.

use clap::{Args, Parser, Subcommand};
use relay_copy::{drivers, Config, CopyError, CopySettings, CopySpec, CopyStrategy, TokioProcessRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "relay-copy")]
#[command(about = "Copy table definitions and data between heterogeneous databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TableArgs {
    /// Source database
    #[arg(long)]
    source_db: String,

    /// Source table
    #[arg(long)]
    table: String,

    /// Source schema
    #[arg(long, default_value = "dbo")]
    schema: String,

    /// Destination database
    #[arg(long)]
    dest_db: String,

    /// Destination table (default: source table name)
    #[arg(long)]
    dest_table: Option<String>,

    /// Table name used for column length overrides (default: source table name)
    #[arg(long)]
    original_table: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the destination table from the source definition
    CopyDefinition {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Recreate the destination table and copy all rows into it
    CopyTable {
        #[command(flatten)]
        table: TableArgs,

        /// Timeout in seconds for each external process (default: copy.timeout_seconds)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Print the column catalog and CREATE statement without changing anything
    ShowCatalog {
        #[command(flatten)]
        table: TableArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(CopyError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let source_kind = config.source.r#type;
    let dest_kind = config.destination.r#type;

    let source = drivers::connect(&config.source).await?;
    let dest = drivers::connect(&config.destination).await?;
    let strategy = CopyStrategy::select(
        source_kind,
        dest_kind,
        source,
        dest,
        Arc::new(TokioProcessRunner::new()),
        &CopySettings::from_config(&config),
    )?;

    match cli.command {
        Commands::CopyDefinition { table } => {
            let spec = build_spec(&config, &table, None);
            let catalog = strategy.copy_table_definition(&spec).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                println!("\nDefinition copied!");
                println!("  Table: {}.{}", spec.dest_database, spec.dest_table);
                println!("  Columns: {}", catalog.len());
            }
        }

        Commands::CopyTable { table, timeout } => {
            let spec = build_spec(&config, &table, timeout);
            let report = strategy.copy_table(&spec).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nCopy completed!");
                println!("  Strategy: {}", report.strategy);
                println!("  Table: {}.{}", spec.dest_database, report.table);
                println!("  Columns: {}", report.columns);
                if let Some(ref file) = report.staged_file {
                    println!("  Staged file: {}", file);
                }
                if let Some(rows) = report.rows_transferred {
                    println!("  Rows: {}", rows);
                }
                println!("  Duration: {:.2}s", report.duration_seconds);
            }
        }

        Commands::ShowCatalog { table } => {
            let spec = build_spec(&config, &table, None);
            let (catalog, create) = strategy.show_catalog(&spec).await?;

            if cli.output_json {
                let out = serde_json::json!({ "columns": catalog, "create_statement": create });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Catalog for {}.{}.{}:", spec.source_database, spec.source_schema, spec.source_table);
                for c in &catalog {
                    println!("  {:<30} {:<20} -> {}", c.source_name, c.source_type_name, c.dest_type());
                }
                println!("\n{}", create);
            }
        }
    }

    Ok(())
}

fn build_spec(config: &Config, args: &TableArgs, timeout: Option<u64>) -> CopySpec {
    CopySpec::new(
        config.source.r#type,
        &args.source_db,
        &args.table,
        config.destination.r#type,
        &args.dest_db,
    )
    .with_schema(&args.schema)
    .with_dest_table(args.dest_table.as_deref())
    .with_original_table(args.original_table.as_deref())
    .with_timeout(timeout.unwrap_or(config.copy.timeout_seconds))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format: {}", other)),
    }

    Ok(())
}
