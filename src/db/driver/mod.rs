//! Database drivers.
//!
//! A driver knows how one database engine stores its data inside its image
//! and how to move dumps in and out of it. Drivers are looked up by the
//! `driver.name` of a `db` role service through a [`DriverRegistry`].

mod mysql;

pub use mysql::MySqlDriver;

use super::DriverError;
use crate::config::{Project, Service};
use crate::runtime::{ContainerRuntime, Mount, PortBinding};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[async_trait]
pub trait DbDriver: Send + Sync {
    /// Check the service is usable with this driver.
    fn validate_service(&self) -> Result<(), DriverError>;

    /// Load the dump at `path` into the running database service.
    async fn import_from(
        &self,
        runtime: &dyn ContainerRuntime,
        project: &Project,
        path: &Path,
    ) -> Result<(), DriverError>;

    /// Write a dump of the running database service to `path`.
    async fn export_to(
        &self,
        runtime: &dyn ContainerRuntime,
        project: &Project,
        path: &Path,
    ) -> Result<(), DriverError>;

    /// Mounts that place the environment directory `data_dir` where the
    /// engine keeps its data.
    fn collect_volumes(&self, data_dir: &Path) -> Vec<Mount>;

    fn collect_environment(&self) -> BTreeMap<String, String>;

    /// Ports published in addition to the service's own port.
    fn collect_ports(&self) -> Vec<PortBinding> {
        Vec::new()
    }

    /// Human readable connection details, in display order.
    fn collect_info(&self) -> Vec<(String, String)>;

    /// Prompt shown when asking the user for a file to import.
    fn prompt_for_import_path(&self) -> String;
}

type DriverConstructor = Box<dyn Fn(&Service) -> Box<dyn DbDriver> + Send + Sync>;

/// Maps driver names to constructors.
pub struct DriverRegistry {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverRegistry {
    /// A registry without any drivers.
    pub fn empty() -> Self {
        DriverRegistry {
            constructors: HashMap::new(),
        }
    }

    /// A registry containing the built-in drivers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(mysql::DRIVER_NAME, |service| {
            Box::new(MySqlDriver::new(service.clone())) as Box<dyn DbDriver>
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&Service) -> Box<dyn DbDriver> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Driver for `service`, or `None` if it has no driver configured.
    pub fn for_service(&self, service: &Service) -> Result<Option<Box<dyn DbDriver>>, DriverError> {
        let Some(config) = &service.driver else {
            return Ok(None);
        };
        let constructor = self
            .constructors
            .get(&config.name)
            .ok_or_else(|| DriverError::UnknownDriver(config.name.clone()))?;
        Ok(Some(constructor(service)))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
