use crate::output::UserOutput;
use riptide::files::import_files;
use riptide::Project;
use std::path::Path;

pub fn run_import_files(
    project: &Project,
    key: &str,
    source: &Path,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    out.status("Copying... this can take some time...");
    let destination = import_files(project, key, source)?;
    out.success(&format!("Imported '{}' to {}", key, destination.display()));
    Ok(())
}
