// ABOUTME: CLI entry point for pg-table-migrator
// ABOUTME: Parses flags and environment, then runs migrate or validate

use std::sync::Arc;

use clap::{Parser, Subcommand};
use pg_table_migrator::commands;
use pg_table_migrator::config::ConfigArgs;
use pg_table_migrator::logging::{LogSink, TracingSink};

#[derive(Parser)]
#[command(name = "pg-table-migrator")]
#[command(about = "Copy selected PostgreSQL tables and roles between databases", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(flatten)]
    config: ConfigArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the configured tables, then synchronize roles (default)
    Migrate {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Check configuration, connectivity, and table existence without copying
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    pg_table_migrator::postgres::init_tls_policy(cli.allow_self_signed_certs);

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink);

    match cli.command {
        None => run_migrate(cli.config, sink).await,
        Some(Commands::Migrate { config }) => run_migrate(config, sink).await,
        Some(Commands::Validate { config }) => {
            commands::validate(config.resolve()?, sink.as_ref()).await
        }
    }
}

async fn run_migrate(args: ConfigArgs, sink: Arc<dyn LogSink>) -> anyhow::Result<()> {
    let report = commands::migrate(args.resolve()?, sink).await?;
    if report.tables.failed > 0 {
        tracing::warn!(
            "{} of {} tables failed; see the log above for details",
            report.tables.failed,
            report.tables.outcomes.len()
        );
    }
    Ok(())
}
