mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands, DbCommands};
use output::{CliOutput, QuietOutput, UserOutput};
use riptide::{
    DockerClient, DriverRegistry, EngineSettings, Error as RiptideError, Parser as ProjectParser,
    ProjectOrchestrator,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The command's own output already explains the failure.
        if let Some(RiptideError::CommandFailed { exit_code, .. }) =
            e.downcast_ref::<RiptideError>()
        {
            std::process::exit(*exit_code);
        }
        if let Some(riptide_error) = e.downcast_ref::<RiptideError>() {
            eprintln!("Error: {}", riptide_error);
            if let Some(suggestion) = riptide_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = EngineSettings::load()?;
    let runtime = DockerClient::new().with_stop_grace(settings.stop_grace_period());
    let orchestrator = ProjectOrchestrator::new(Arc::new(runtime), settings)
        .with_drivers(DriverRegistry::with_builtin());

    let parser = ProjectParser::new(orchestrator.drivers());
    let project_path = match cli.project.clone() {
        Some(path) => path,
        None => ProjectParser::find_project_file()?,
    };
    let project = parser.load_project(&project_path)?;
    tracing::debug!(
        "Loaded project '{}' from {}",
        project.name,
        project_path.display()
    );

    let machine_readable = matches!(
        cli.command,
        Commands::Status { json: true } | Commands::Db(DbCommands::List { json: true, .. })
    );
    let out: &dyn UserOutput = if machine_readable {
        &QuietOutput
    } else {
        &CliOutput
    };

    match &cli.command {
        Commands::Start { selection, quick } => {
            commands::run_start(&orchestrator, &project, selection, *quick, cli.verbose, out)
                .await
        }
        Commands::Stop { selection } => {
            commands::run_stop(&orchestrator, &project, selection, cli.verbose, out).await
        }
        Commands::Restart { selection, quick } => {
            commands::run_restart(&orchestrator, &project, selection, *quick, cli.verbose, out)
                .await
        }
        Commands::Status { json } => {
            commands::run_status(&orchestrator, &project, *json, out).await
        }
        Commands::Exec { service, command } => {
            commands::run_exec(&orchestrator, &project, service.as_deref(), command).await
        }
        Commands::Cmd { name, args } => {
            commands::run_cmd(&orchestrator, &project, name, args).await
        }
        Commands::ImportFiles { key, path } => {
            commands::run_import_files(&project, key, path, out)
        }
        Commands::Db(db_cmd) => {
            commands::run_db(db_cmd, &orchestrator, &project, cli.verbose, out).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
