// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use crate::db::{DriverError, EnvironmentError};
use crate::runtime::RuntimeError;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(riptide::config::invalid),
        help("Check the services section of your riptide.yml")
    )]
    Config(String),

    #[error("Service not found: {0}")]
    #[diagnostic(
        code(riptide::service::not_found),
        help("List the services of this project with `riptide status`")
    )]
    ServiceNotFound(String),

    #[error("Command not found: {0}")]
    #[diagnostic(
        code(riptide::command::not_found),
        help("Check the commands section of your riptide.yml")
    )]
    CommandNotFound(String),

    #[error("Service '{0}' is not running")]
    #[diagnostic(code(riptide::service::not_running))]
    ServiceNotRunning(String),

    #[error("Command '{name}' exited with code {exit_code}")]
    #[diagnostic(code(riptide::command::failed))]
    CommandFailed { name: String, exit_code: i32 },

    #[error("Import failed: {0}")]
    #[diagnostic(code(riptide::import::failed))]
    Import(String),

    #[error("Container runtime error: {0}")]
    #[diagnostic(
        code(riptide::runtime::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    #[diagnostic(code(riptide::db::environment))]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    #[diagnostic(code(riptide::db::driver))]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation aborted by user")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Config(msg) if msg.contains("Could not find") => Some(
                "Run riptide from a directory containing riptide.yml, or pass --project <path>"
                    .to_string(),
            ),
            Error::Config(_) => Some("Check the services section of your riptide.yml".to_string()),
            Error::ServiceNotFound(name) => Some(format!(
                "'{}' is not defined in this project. Check 'riptide status' for the available services.",
                name
            )),
            Error::CommandNotFound(name) => Some(format!(
                "'{}' is not defined in the commands section of your riptide.yml",
                name
            )),
            Error::ServiceNotRunning(name) => {
                Some(format!("Start it first with: riptide start {}", name))
            }
            Error::Runtime(e) if e.is_communication_failure() => {
                Some("Check that Docker is running: docker ps".to_string())
            }
            Error::Environment(EnvironmentError::NotFound(name)) => Some(format!(
                "The environment does not exist, create it first with: riptide db new {}",
                name
            )),
            Error::Environment(EnvironmentError::AlreadyExists(name)) => Some(format!(
                "Switch to it with: riptide db switch {}",
                name
            )),
            Error::Environment(EnvironmentError::CannotDeleteActive(_)) => Some(
                "Switch to another environment first: riptide db switch <name>".to_string(),
            ),
            Error::Environment(EnvironmentError::InvalidName(_)) => Some(
                "Environment names may only contain letters, digits, '.', '_' and '-'".to_string(),
            ),
            Error::Driver(DriverError::UnknownDriver(_)) => {
                Some("The only built-in database driver is 'mysql'".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
