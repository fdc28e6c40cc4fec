use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use plutus_sync::IngestCommand;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "plutus-cli")]
#[command(about = "Plutus funnel ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Run every stage except the database write.
    #[arg(long)]
    dry_run: bool,
    /// Debug-level logging (RUST_LOG takes precedence when set).
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest lead sheets (TOFU).
    IngestLeads {
        /// Only the sheet whose name or tab matches.
        #[arg(long)]
        sheet: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Ingest the transactions export (BOFU).
    IngestTransactions {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Ingest lead assignments (MOFU).
    IngestAssignments {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Ingest Zoom webinar attendance.
    IngestWebinar {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Apply database migrations.
    Migrate {
        #[arg(long, short)]
        verbose: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (ingest, common) = match cli.command {
        Commands::IngestLeads { sheet, common } => (IngestCommand::Leads { sheet }, common),
        Commands::IngestTransactions { common } => (IngestCommand::Transactions, common),
        Commands::IngestAssignments { common } => (IngestCommand::Assignments, common),
        Commands::IngestWebinar { common } => (IngestCommand::Webinar, common),
        Commands::Migrate { verbose } => {
            init_tracing(verbose);
            return finish(block_on(plutus_sync::migrate_from_env()).map(|()| true));
        }
    };
    init_tracing(common.verbose);

    let result = block_on(plutus_sync::run_from_env(&ingest, common.dry_run)).map(|summary| {
        print!("{}", summary.render_table());
        !summary.has_errors()
    });
    finish(result)
}

fn block_on<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(fut)
}

fn finish(result: Result<bool>) -> ExitCode {
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn leads_flags_parse() {
        let cli = Cli::parse_from(["plutus-cli", "ingest-leads", "--sheet", "ACCA", "--dry-run"]);
        match cli.command {
            Commands::IngestLeads { sheet, common } => {
                assert_eq!(sheet.as_deref(), Some("ACCA"));
                assert!(common.dry_run);
                assert!(!common.verbose);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
