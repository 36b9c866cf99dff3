//! Docker implementation of the container runtime capability set.
//!
//! Also owns the deterministic naming scheme: every container and network the
//! engine creates is derived from the project and service names, so the same
//! (project, service) pair always maps to the same container identity.

pub mod client;

pub use client::DockerClient;

/// Label carrying the owning project name.
pub const LABEL_PROJECT: &str = "riptide_project";
/// Label carrying the service name.
pub const LABEL_SERVICE: &str = "riptide_service";
/// Label set to `1` for the service with the `main` role, `0` otherwise.
pub const LABEL_MAIN: &str = "riptide_main";

const NAME_PREFIX: &str = "riptide";

/// Container identity for a service of a project.
pub fn container_name(project_name: &str, service_name: &str) -> String {
    format!(
        "{}__{}__{}",
        NAME_PREFIX,
        sanitize_name_component(project_name),
        sanitize_name_component(service_name)
    )
}

/// Name of the per-project network all service containers join.
pub fn network_name(project_name: &str) -> String {
    format!("{}__{}", NAME_PREFIX, sanitize_name_component(project_name))
}

/// Name for a throwaway container running a one-off command for a service.
///
/// The process id keeps two concurrent CLI invocations from colliding.
pub fn oneshot_container_name(project_name: &str, service_name: &str, purpose: &str) -> String {
    format!(
        "{}__{}",
        container_name(project_name, service_name),
        sanitize_name_component(&format!("{}__{}", purpose, std::process::id()))
    )
}

/// Name for the throwaway container of a project command.
pub fn command_container_name(project_name: &str, command_name: &str) -> String {
    format!(
        "{}__{}__cmd__{}",
        NAME_PREFIX,
        sanitize_name_component(project_name),
        sanitize_name_component(&format!("{}__{}", command_name, std::process::id()))
    )
}

/// Sanitize a string for use in Docker object names.
///
/// Docker names must match `[a-zA-Z0-9][a-zA-Z0-9_.-]*`:
/// - invalid characters become underscores
/// - the result is truncated to 64 characters
/// - a leading non-alphanumeric character is replaced with `x`
pub(crate) fn sanitize_name_component(input: &str) -> String {
    const MAX_COMPONENT_LEN: usize = 64;

    if input.is_empty() {
        return "unnamed".to_string();
    }

    // Every char is ASCII after this map, so byte slicing below is safe.
    let sanitized: String = input
        .chars()
        .take(MAX_COMPONENT_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.starts_with(|c: char| !c.is_ascii_alphanumeric()) {
        format!("x{}", &sanitized[1..])
    } else {
        sanitized
    }
}
