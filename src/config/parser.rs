use super::project::Project;
use crate::db::DriverRegistry;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const PROJECT_FILE_NAME: &str = "riptide.yml";
const PROJECT_FILE_ALT_NAME: &str = "riptide.yaml";

/// Loads an already-resolved project document and checks the structure the
/// engine relies on.
pub struct Parser<'a> {
    drivers: &'a DriverRegistry,
}

impl<'a> Parser<'a> {
    pub fn new(drivers: &'a DriverRegistry) -> Self {
        Self { drivers }
    }

    /// Find the project file starting from the current directory.
    pub fn find_project_file() -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_project_in_dir(&current_dir)
    }

    pub fn find_project_in_dir(dir: &Path) -> Result<PathBuf> {
        for name in [PROJECT_FILE_NAME, PROJECT_FILE_ALT_NAME] {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        match dir.parent() {
            Some(parent) => Self::find_project_in_dir(parent),
            None => Err(Error::Config(format!(
                "Could not find {} in current directory or any parent",
                PROJECT_FILE_NAME
            ))),
        }
    }

    /// Load a project from a file path.
    pub fn load_project<P: AsRef<Path>>(&self, path: P) -> Result<Project> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read project file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let folder = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Config("Invalid project path".to_string()))?;
        let folder = if folder.as_os_str().is_empty() {
            std::env::current_dir()?
        } else {
            folder
        };

        self.parse_project(&content, folder)
    }

    /// Parse a project from a YAML string located in `folder`.
    pub fn parse_project(&self, content: &str, folder: PathBuf) -> Result<Project> {
        let mut project: Project = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse project file: {}", e)))?;

        if project.name.trim().is_empty() {
            project.name = folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        project.folder = folder;
        for (name, service) in project.services.iter_mut() {
            service.name = name.clone();
        }
        for (name, command) in project.commands.iter_mut() {
            command.name = name.clone();
        }

        self.validate(&project)?;
        Ok(project)
    }

    /// Structural checks only; the document is assumed to be resolved.
    pub fn validate(&self, project: &Project) -> Result<()> {
        if project.name.trim().is_empty() {
            return Err(Error::Config("Project name must not be empty".to_string()));
        }

        for (name, service) in &project.services {
            if name.trim().is_empty() {
                return Err(Error::Config("Service names must not be empty".to_string()));
            }
            if service.image.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Service '{}' has no image",
                    name
                )));
            }
            service.mounts(project.folder())?;
            if let Some(driver) = &service.driver {
                if !self.drivers.contains(&driver.name) {
                    return Err(Error::Config(format!(
                        "Service '{}' uses unknown database driver '{}'",
                        name, driver.name
                    )));
                }
            }
        }

        for (name, command) in &project.commands {
            if command.image.trim().is_empty() {
                return Err(Error::Config(format!("Command '{}' has no image", name)));
            }
            if command.command.trim().is_empty() {
                return Err(Error::Config(format!("Command '{}' has no command line", name)));
            }
            command.mounts(project.folder())?;
        }

        for (key, import) in &project.imports {
            let escapes = import
                .target
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if import.target.as_os_str().is_empty() || escapes {
                return Err(Error::Config(format!(
                    "Import '{}' must target a path inside the project directory",
                    key
                )));
            }
        }

        let db_services = project.services.values().filter(|s| s.is_db()).count();
        if db_services > 1 {
            return Err(Error::Config(
                "Only one service may have the 'db' role".to_string(),
            ));
        }

        if let Some(defaults) = &project.default_services {
            let mut seen = HashSet::new();
            for name in defaults {
                if !project.services.contains_key(name) {
                    return Err(Error::Config(format!(
                        "default_services references unknown service '{}'",
                        name
                    )));
                }
                if !seen.insert(name) {
                    return Err(Error::Config(format!(
                        "default_services lists '{}' twice",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}
