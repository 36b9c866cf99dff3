//! Service configuration types.
//!
//! This module contains the [`Service`] struct: one container-backed unit of
//! a project, already resolved by whatever produced the project document.

use crate::error::{Error, Result};
use crate::runtime::{Mount, PortBinding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Role of the service users interact with by default.
pub const ROLE_MAIN: &str = "main";
/// Role of services whose source code lives in the project.
pub const ROLE_SRC: &str = "src";
/// Role of the database service whose data is managed by db environments.
pub const ROLE_DB: &str = "db";

/// Command override for the service container.
///
/// A plain string is handed to the image's shell; a list is passed as argv.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Args(Vec<String>),
}

impl CommandLine {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            CommandLine::Shell(cmd) => vec!["/bin/sh".to_string(), "-c".to_string(), cmd.clone()],
            CommandLine::Args(args) => args.clone(),
        }
    }
}

/// Database driver selection for a `db` role service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub name: String,

    /// Driver specific settings, e.g. `password` and `database` for mysql.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// Service configuration for a single service of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Filled in from the map key by the parser.
    #[serde(skip)]
    pub name: String,

    pub image: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub roles: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandLine>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Container port published on the same host port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// `host:container[:ro]` bind mounts; relative host paths are resolved
    /// against the project directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_start: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_start: Vec<String>,

    #[serde(default)]
    pub run_as_root: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverConfig>,
}

impl Service {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Service {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_main(&self) -> bool {
        self.has_role(ROLE_MAIN)
    }

    pub fn is_db(&self) -> bool {
        self.has_role(ROLE_DB)
    }

    /// Parse the configured volumes into runtime mounts.
    pub fn mounts(&self, project_dir: &Path) -> Result<Vec<Mount>> {
        self.volumes
            .iter()
            .map(|v| parse_volume(v, project_dir))
            .collect()
    }

    pub fn port_bindings(&self) -> Vec<PortBinding> {
        self.port
            .map(|p| PortBinding {
                host: p,
                container: p,
            })
            .into_iter()
            .collect()
    }
}

/// Parse a `host:container[:ro|:rw]` volume string.
pub fn parse_volume(volume: &str, project_dir: &Path) -> Result<Mount> {
    let parts: Vec<&str> = volume.split(':').collect();
    let (host, container, read_only) = match parts.as_slice() {
        [host, container] => (*host, *container, false),
        [host, container, "ro"] => (*host, *container, true),
        [host, container, "rw"] => (*host, *container, false),
        _ => {
            return Err(Error::Config(format!(
                "Invalid volume '{}': expected host:container[:ro]",
                volume
            )))
        }
    };
    if host.is_empty() || !container.starts_with('/') {
        return Err(Error::Config(format!(
            "Invalid volume '{}': container path must be absolute",
            volume
        )));
    }

    let host = Path::new(host);
    let host = if host.is_absolute() {
        host.to_path_buf()
    } else {
        project_dir.join(host)
    };

    Ok(Mount {
        host,
        container: container.to_string(),
        read_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_volume_relative_host() {
        let mount = parse_volume("./src:/app", Path::new("/work/shop")).unwrap();
        assert_eq!(mount.host, PathBuf::from("/work/shop/./src"));
        assert_eq!(mount.container, "/app");
        assert!(!mount.read_only);
    }

    #[test]
    fn test_parse_volume_read_only() {
        let mount = parse_volume("/etc/hosts:/etc/hosts:ro", Path::new("/work")).unwrap();
        assert!(mount.read_only);
        assert_eq!(mount.host, PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_parse_volume_rejects_garbage() {
        assert!(parse_volume("just-a-path", Path::new("/")).is_err());
        assert!(parse_volume("a:relative", Path::new("/")).is_err());
        assert!(parse_volume("a:/b:sometimes", Path::new("/")).is_err());
    }

    #[test]
    fn test_command_line_forms() {
        let shell: CommandLine = serde_yaml::from_str("\"npm start\"").unwrap();
        assert_eq!(shell.to_args(), vec!["/bin/sh", "-c", "npm start"]);

        let args: CommandLine = serde_yaml::from_str("[npm, start]").unwrap();
        assert_eq!(args.to_args(), vec!["npm", "start"]);
    }

    #[test]
    fn test_absent_and_empty_stay_distinct() {
        let absent: Service = serde_yaml::from_str("image: nginx").unwrap();
        assert!(absent.command.is_none());
        assert!(absent.driver.is_none());

        let empty: Service = serde_yaml::from_str("image: nginx\ncommand: []").unwrap();
        assert_eq!(empty.command, Some(CommandLine::Args(vec![])));
    }
}
