//! Project commands: tools run in throwaway containers next to the services.

use super::service::parse_volume;
use crate::error::Result;
use crate::runtime::Mount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A command of a project, e.g. `composer` or `npm`, run with `riptide cmd`.
///
/// The container joins the project network, so it reaches every service by
/// name, and is removed as soon as the command exits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectCommand {
    /// Filled in from the map key by the parser.
    #[serde(skip)]
    pub name: String,

    pub image: String,

    /// Shell command line; arguments given on the command line are appended.
    pub command: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Same format as service volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub run_as_root: bool,
}

impl ProjectCommand {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        ProjectCommand {
            name: name.into(),
            image: image.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn mounts(&self, project_dir: &Path) -> Result<Vec<Mount>> {
        self.volumes
            .iter()
            .map(|v| parse_volume(v, project_dir))
            .collect()
    }

    /// The configured command line followed by `args`, each quoted for `sh`.
    pub fn command_line(&self, args: &[String]) -> String {
        let mut line = self.command.clone();
        for arg in args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }
}

/// Quote `arg` so `sh -c` passes it through as a single word.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_arguments_are_untouched() {
        let cmd = ProjectCommand::new("composer", "composer:2", "composer");
        let args = vec!["require".to_string(), "vendor/pkg:^1.0".to_string()];
        assert_eq!(cmd.command_line(&args), "composer require 'vendor/pkg:^1.0'");
        assert_eq!(cmd.command_line(&[]), "composer");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("--dry-run"), "--dry-run");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }
}
