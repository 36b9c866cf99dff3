//! Copying files into a project under one of its import keys.

use crate::config::Project;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Copy `source` to the target of import `key`, returning the destination.
///
/// A directory is merged into an existing target directory; files already
/// there are overwritten, never removed. A file is only copied if nothing
/// exists at the target yet.
pub fn import_files(project: &Project, key: &str, source: &Path) -> Result<PathBuf> {
    let import = project.imports.get(key).ok_or_else(|| {
        let keys: Vec<&str> = project.imports.keys().map(String::as_str).collect();
        Error::Import(format!(
            "Unknown import key '{}'. Valid keys are: {}",
            key,
            keys.join(", ")
        ))
    })?;
    if !source.exists() {
        return Err(Error::Import(format!(
            "'{}' does not exist",
            source.display()
        )));
    }

    let destination = project.folder().join(&import.target);
    if destination.is_file() {
        return Err(Error::Import(format!(
            "The target file {} already exists",
            import.target.display()
        )));
    }
    let source_is_file = source.is_file();
    if source_is_file && destination.exists() {
        return Err(Error::Import(format!(
            "The target {} is a directory, but '{}' is a file",
            import.target.display(),
            source.display()
        )));
    }

    tracing::info!(
        "Importing {} ({}) from {}",
        key,
        import.target.display(),
        source.display()
    );
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    if source_is_file {
        fs::copy(source, &destination)?;
    } else {
        merge_dir(source, &destination)?;
    }
    Ok(destination)
}

fn merge_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            merge_dir(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportTarget;

    fn project(folder: &Path) -> Project {
        let mut project = Project::new("shop", folder);
        project.imports.insert(
            "media".to_string(),
            ImportTarget {
                target: PathBuf::from("public/media"),
                name: Some("Uploaded media".to_string()),
            },
        );
        project.imports.insert(
            "config".to_string(),
            ImportTarget {
                target: PathBuf::from("app/config.php"),
                name: None,
            },
        );
        project
    }

    #[test]
    fn test_directory_is_merged_into_target() {
        let project_dir = tempfile::tempdir().unwrap();
        let upload = tempfile::tempdir().unwrap();
        let project = project(project_dir.path());

        let existing = project_dir.path().join("public/media");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("keep.png"), b"old").unwrap();
        fs::write(existing.join("logo.png"), b"old").unwrap();
        fs::create_dir_all(upload.path().join("thumbs")).unwrap();
        fs::write(upload.path().join("logo.png"), b"new").unwrap();
        fs::write(upload.path().join("thumbs/logo.png"), b"small").unwrap();

        let destination = import_files(&project, "media", upload.path()).unwrap();
        assert_eq!(destination, existing);
        assert_eq!(fs::read(existing.join("keep.png")).unwrap(), b"old");
        assert_eq!(fs::read(existing.join("logo.png")).unwrap(), b"new");
        assert_eq!(fs::read(existing.join("thumbs/logo.png")).unwrap(), b"small");
    }

    #[test]
    fn test_file_is_copied_once() {
        let project_dir = tempfile::tempdir().unwrap();
        let upload = tempfile::tempdir().unwrap();
        let project = project(project_dir.path());
        let file = upload.path().join("config.php");
        fs::write(&file, b"<?php return [];").unwrap();

        let destination = import_files(&project, "config", &file).unwrap();
        assert_eq!(fs::read(&destination).unwrap(), b"<?php return [];");

        let err = import_files(&project, "config", &file).unwrap_err();
        assert!(matches!(err, Error::Import(ref msg) if msg.contains("already exists")));
    }

    #[test]
    fn test_file_onto_directory_is_rejected() {
        let project_dir = tempfile::tempdir().unwrap();
        let upload = tempfile::tempdir().unwrap();
        let project = project(project_dir.path());
        fs::create_dir_all(project_dir.path().join("public/media")).unwrap();
        let file = upload.path().join("logo.png");
        fs::write(&file, b"png").unwrap();

        let err = import_files(&project, "media", &file).unwrap_err();
        assert!(matches!(err, Error::Import(ref msg) if msg.contains("is a directory")));
    }

    #[test]
    fn test_unknown_key_and_missing_source() {
        let project_dir = tempfile::tempdir().unwrap();
        let project = project(project_dir.path());

        let err = import_files(&project, "assets", project_dir.path()).unwrap_err();
        assert!(matches!(err, Error::Import(ref msg) if msg.contains("config, media")));

        let missing = project_dir.path().join("nope");
        let err = import_files(&project, "media", &missing).unwrap_err();
        assert!(matches!(err, Error::Import(ref msg) if msg.contains("does not exist")));
        assert!(!project_dir.path().join("public").exists());
    }
}
