//! Command line entry point
//!
//! Credentials and ids come from environment variables (see
//! [`testcase_migrator::config`]); the command line only picks the source and
//! the run mode.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use testcase_migrator::config::{
    JiraConfig, RunConfig, TestRailConfig, TestomatioConfig, XrayConfig,
};
use testcase_migrator::destination::TestomatioClient;
use testcase_migrator::error::MigrationError;
use testcase_migrator::migrate::{MigrationReport, Migrator};
use testcase_migrator::source::{JiraClient, JiraSource, SourceReader, TestRailSource, XraySource};

/// Migrate test cases into Testomat.io
#[derive(Parser, Debug)]
#[command(name = "testcase-migrator", version)]
struct Cli {
    /// Migrate only this folder (or section) and its descendants
    #[arg(long, value_name = "ID", global = true)]
    folder: Option<String>,
    /// Read everything, write nothing (also enabled by `DRY_RUN`)
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Xray test repository: folders, tests, steps, preconditions
    Xray,
    /// TestRail project: sections, cases, steps, priorities
    Testrail,
    /// Jira `Test` issues only, all placed in the Root suite
    Jira,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(report) => report.log_summary(),
        Err(e) => {
            tracing::error!(error = %e, "migration aborted");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<MigrationReport, MigrationError> {
    let mut run_config = RunConfig::from_env();
    run_config.dry_run |= cli.dry_run;
    run_config.folder_id = cli.folder;
    let destination = TestomatioConfig::from_env()?;

    match cli.command {
        Commands::Xray => {
            let jira = JiraClient::new(JiraConfig::from_env()?)?;
            let xray = XrayConfig::from_env()?;
            if run_config.folder_id.is_none() {
                run_config.folder_id = xray.folder_id.clone();
            }
            migrate(XraySource::new(xray, jira)?, destination, run_config)
        }
        Commands::Testrail => {
            let source = TestRailSource::new(TestRailConfig::from_env()?)?;
            migrate(source, destination, run_config)
        }
        Commands::Jira => {
            let source = JiraSource::new(JiraClient::new(JiraConfig::from_env()?)?);
            migrate(source, destination, run_config)
        }
    }
}

fn migrate<S: SourceReader>(
    source: S,
    config: TestomatioConfig,
    run_config: RunConfig,
) -> Result<MigrationReport, MigrationError> {
    if run_config.dry_run {
        tracing::info!("dry run: no data will be written to the destination");
    }

    let mut destination = TestomatioClient::new(config, run_config.dry_run)?;
    destination.login()?;

    Migrator::new(source, destination)
        .with_folder(run_config.folder_id)
        .run()
}
