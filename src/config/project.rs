use super::command::ProjectCommand;
use super::service::Service;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default name of the per-project metadata directory.
pub const META_DIR_NAME: &str = "_riptide";

/// Where files imported under a key are copied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTarget {
    /// Relative to the project directory.
    pub target: PathBuf,

    /// Human readable description, e.g. "Uploaded media".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A resolved project: every service the orchestrator may start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Defaults to the project directory name when absent.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub services: BTreeMap<String, Service>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, ProjectCommand>,

    /// Targets for `riptide import-files`, by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub imports: BTreeMap<String, ImportTarget>,

    /// Services started by `start --default`. Absent means "all services",
    /// an empty list means "none".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_services: Option<Vec<String>>,

    /// Overrides `<project dir>/_riptide`. Relative paths are resolved against
    /// the project directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_dir: Option<PathBuf>,

    /// Directory the project document was loaded from.
    #[serde(skip)]
    pub folder: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Project {
            name: name.into(),
            folder: folder.into(),
            ..Default::default()
        }
    }

    /// Add a service, keyed by its name.
    pub fn with_service(mut self, service: Service) -> Self {
        self.services.insert(service.name.clone(), service);
        self
    }

    pub fn service(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    pub fn with_command(mut self, command: ProjectCommand) -> Self {
        self.commands.insert(command.name.clone(), command);
        self
    }

    pub fn command(&self, name: &str) -> Result<&ProjectCommand> {
        self.commands
            .get(name)
            .ok_or_else(|| Error::CommandNotFound(name.to_string()))
    }

    /// The service carrying the `db` role, if any.
    pub fn db_service(&self) -> Option<&Service> {
        self.services.values().find(|s| s.is_db())
    }

    pub fn main_service(&self) -> Option<&Service> {
        self.services.values().find(|s| s.is_main())
    }

    pub fn meta_dir(&self) -> PathBuf {
        match &self.meta_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.folder.join(dir),
            None => self.folder.join(META_DIR_NAME),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Names started by `--default`.
    pub fn default_service_names(&self) -> Vec<String> {
        match &self.default_services {
            Some(names) => names.clone(),
            None => self.service_names(),
        }
    }
}
