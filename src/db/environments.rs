//! Named database data directories ("environments") of a project.
//!
//! Layout under the project meta directory:
//!
//! ```text
//! _riptide/db_data/
//!   .current          name of the active environment
//!   default/          one directory per environment
//!   staging/
//! ```
//!
//! New environments are built in a hidden temporary directory and renamed
//! into place; dropped environments are renamed away before being deleted;
//! the marker is replaced with an atomic rename. A failed operation therefore
//! never leaves a half-created or half-deleted environment behind.
//!
//! Concurrent `switch` calls for the same project are not serialized here.

use super::EnvironmentError;
use crate::config::Project;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DB_DATA_DIR: &str = "db_data";
pub const DEFAULT_ENVIRONMENT: &str = "default";

const CURRENT_MARKER: &str = ".current";
const MAX_NAME_LEN: usize = 64;

type Result<T> = std::result::Result<T, EnvironmentError>;

static NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn name_regex() -> &'static Regex {
    NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static regex pattern is valid")
    })
}

/// Whether `name` can be used as an environment name.
///
/// Names start with a letter or digit and otherwise contain only letters,
/// digits, `.`, `_` and `-`, so they can never escape the environment root.
pub fn is_valid_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && name_regex().is_match(name)
}

fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(EnvironmentError::InvalidName(name.to_string()))
    }
}

/// Manages the db environments of one project.
#[derive(Debug, Clone)]
pub struct DbEnvironmentManager {
    root: PathBuf,
}

impl DbEnvironmentManager {
    pub fn new(project: &Project) -> Self {
        Self::at(project.meta_dir().join(DB_DATA_DIR))
    }

    /// Manager rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        DbEnvironmentManager { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn marker_path(&self) -> PathBuf {
        self.root.join(CURRENT_MARKER)
    }

    /// Directory of an environment, whether or not it exists.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        is_valid_name(name) && self.root.join(name).is_dir()
    }

    /// Names of all existing environments, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            // Temporary and trash directories are hidden and fail validation.
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Name of the active environment.
    ///
    /// On first use the `default` environment is created and selected.
    pub fn currently_selected(&self) -> Result<String> {
        match fs::read_to_string(self.marker_path()) {
            Ok(content) => {
                let name = content.trim();
                validate_name(name)?;
                Ok(name.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.ensure_default()?;
                Ok(DEFAULT_ENVIRONMENT.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Directory of the active environment, created if needed.
    pub fn current_data_dir(&self) -> Result<PathBuf> {
        let name = self.currently_selected()?;
        let path = self.root.join(&name);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
        }
        Ok(path)
    }

    fn ensure_default(&self) -> Result<()> {
        fs::create_dir_all(self.root.join(DEFAULT_ENVIRONMENT))?;
        self.write_marker(DEFAULT_ENVIRONMENT)?;
        tracing::info!("Created default database environment in {}", self.root.display());
        Ok(())
    }

    /// Create environment `name`, optionally as a copy of `copy_from`.
    pub fn new_environment(&self, name: &str, copy_from: Option<&str>) -> Result<()> {
        validate_name(name)?;
        let target = self.root.join(name);
        if target.exists() {
            return Err(EnvironmentError::AlreadyExists(name.to_string()));
        }
        let source = match copy_from {
            Some(source) => {
                validate_name(source).map_err(|_| EnvironmentError::NotFound(source.to_string()))?;
                let path = self.root.join(source);
                if !path.is_dir() {
                    return Err(EnvironmentError::NotFound(source.to_string()));
                }
                Some(path)
            }
            None => None,
        };

        fs::create_dir_all(&self.root)?;
        // Dropped on any early return, which removes the partial copy.
        let staging = tempfile::Builder::new()
            .prefix(".new-")
            .tempdir_in(&self.root)?;
        // Temporary directories are private; take the mode of the source or
        // of a freshly created directory instead.
        let template = source.as_deref().unwrap_or(self.root.as_path());
        fs::set_permissions(staging.path(), fs::metadata(template)?.permissions())?;
        if let Some(source) = &source {
            copy_dir_all(source, staging.path())?;
        }
        if target.exists() {
            return Err(EnvironmentError::AlreadyExists(name.to_string()));
        }
        fs::rename(staging.path(), &target)?;
        // The staging path no longer exists, so dropping the guard is a no-op.
        drop(staging);

        match copy_from {
            Some(source) => tracing::info!("Created database environment '{}' from '{}'", name, source),
            None => tracing::info!("Created database environment '{}'", name),
        }
        Ok(())
    }

    /// Make `name` the active environment.
    ///
    /// The database service must not be running while this happens.
    pub fn switch(&self, name: &str) -> Result<()> {
        if !self.exists(name) {
            validate_name(name)?;
            return Err(EnvironmentError::NotFound(name.to_string()));
        }
        self.write_marker(name)?;
        tracing::info!("Switched database environment to '{}'", name);
        Ok(())
    }

    /// Delete environment `name`. The active environment cannot be deleted.
    pub fn drop_environment(&self, name: &str) -> Result<()> {
        if !self.exists(name) {
            validate_name(name)?;
            return Err(EnvironmentError::NotFound(name.to_string()));
        }
        if self.currently_selected()? == name {
            return Err(EnvironmentError::CannotDeleteActive(name.to_string()));
        }

        let trash = self
            .root
            .join(format!(".trash-{}-{}", name, std::process::id()));
        fs::rename(self.root.join(name), &trash)?;
        if let Err(e) = fs::remove_dir_all(&trash) {
            tracing::warn!(
                "Environment '{}' was dropped but {} could not be removed: {}",
                name,
                trash.display(),
                e
            );
        }
        tracing::info!("Dropped database environment '{}'", name);
        Ok(())
    }

    fn write_marker(&self, name: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(&self.root)?;
        temp_file.write_all(name.as_bytes())?;
        temp_file.flush()?;
        temp_file
            .persist(self.marker_path())
            .map_err(|e| EnvironmentError::Io(e.error))?;
        Ok(())
    }
}

/// Recursively copy the contents of `source` into the existing directory `target`.
fn copy_dir_all(source: &Path, target: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let destination = target.join(entry.file_name());
        if file_type.is_dir() {
            fs::create_dir(&destination)?;
            copy_dir_all(&entry.path(), &destination)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}
