use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "riptide")]
#[command(about = "Riptide - Per-project development environments in containers")]
pub struct Cli {
    /// Project file path (defaults to riptide.yml in this or a parent directory)
    #[arg(short, long, env = "RIPTIDE_PROJECT")]
    pub project: Option<PathBuf>,

    /// Verbose output: debug logging and full error cause chains
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which services a start/stop/restart applies to.
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceSelection {
    /// Services to act on
    pub services: Vec<String>,

    /// All services of the project
    #[arg(short, long, conflicts_with = "services")]
    pub all: bool,

    /// The project's default services
    #[arg(short, long, conflicts_with_all = ["services", "all"])]
    pub default: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start services
    Start {
        #[command(flatten)]
        selection: ServiceSelection,

        /// Skip pre-start and post-start commands
        #[arg(short, long)]
        quick: bool,
    },
    /// Stop services
    Stop {
        #[command(flatten)]
        selection: ServiceSelection,
    },
    /// Stop and start services again
    Restart {
        #[command(flatten)]
        selection: ServiceSelection,

        /// Skip pre-start and post-start commands
        #[arg(short, long)]
        quick: bool,
    },
    /// Show service status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a command in a running service container
    Exec {
        /// Service to run in (defaults to the service with the main role)
        #[arg(short, long)]
        service: Option<String>,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a project command in a throwaway container
    Cmd {
        /// Name of the command in the project's commands section
        name: String,

        /// Arguments appended to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Copy files into the project under one of its import keys
    ImportFiles {
        /// Key in the project's imports section
        key: String,

        /// File or directory to import
        path: PathBuf,
    },
    /// Manage database environments
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Show the active environment and connection details
    Status,
    /// List database environments
    List {
        /// Only print the active environment
        #[arg(long)]
        current: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Switch the active environment, restarting the database
    Switch {
        name: String,
    },
    /// Create a new, empty environment and switch to it
    New {
        name: String,

        /// Stay on the current environment
        #[arg(long)]
        stay: bool,
    },
    /// Copy an environment and switch to the copy
    Copy {
        from: String,
        to: String,

        /// Stay on the current environment
        #[arg(long)]
        stay: bool,
    },
    /// Delete an environment
    Drop {
        name: String,
    },
    /// Import a dump into the active environment
    Import {
        file: Option<PathBuf>,
    },
    /// Export the active environment to a dump file
    Export {
        file: PathBuf,
    },
}
