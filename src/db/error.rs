use crate::runtime::RuntimeError;
use std::io;
use thiserror::Error;

/// Failures of db environment management. Raised synchronously; every
/// operation leaves the environment root untouched when it fails.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Database environment '{0}' does not exist")]
    NotFound(String),

    #[error("Database environment '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid database environment name '{0}'")]
    InvalidName(String),

    #[error("Database environment '{0}' is currently active and cannot be deleted")]
    CannotDeleteActive(String),

    #[error("Database environment IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Unknown database driver '{0}'")]
    UnknownDriver(String),

    #[error("{service}: {reason}")]
    Validation { service: String, reason: String },

    #[error("Database {operation} failed: {output}")]
    ImportExport { operation: String, output: String },

    #[error("Database command could not be run: {0}")]
    Runtime(#[from] RuntimeError),
}

impl DriverError {
    pub fn validation(service: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::Validation {
            service: service.into(),
            reason: reason.into(),
        }
    }
}
