//! Container runtime capability interface.
//!
//! The orchestration core never talks to a container daemon directly. It
//! consumes the [`ContainerRuntime`] trait, which the Docker CLI client in
//! [`crate::docker`] implements and which tests replace with a scripted fake.

mod error;

pub use error::RuntimeError;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Stream of status events produced while an image is being pulled.
pub type PullStream = BoxStream<'static, Result<PullEvent, RuntimeError>>;

/// One status line reported during an image pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullEvent {
    pub status: String,
    pub progress: Option<String>,
}

impl PullEvent {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }
}

impl fmt::Display for PullEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.progress {
            Some(progress) => write!(f, "{} : {}", self.status, progress),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Coarse container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }

    /// The container is gone for practical purposes and must be recreated.
    pub fn is_exited(self) -> bool {
        matches!(self, ContainerStatus::Exited | ContainerStatus::Dead)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of inspecting an existing container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub exit_code: Option<i32>,
    /// Last log lines; only collected for containers that have exited.
    pub log_tail: Option<String>,
}

impl ContainerState {
    pub fn running() -> Self {
        Self {
            status: ContainerStatus::Running,
            exit_code: None,
            log_tail: None,
        }
    }
}

/// A host path bound into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// Everything the runtime needs to create a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub entrypoint: Option<Vec<String>>,
    pub command: Option<Vec<String>>,
    pub environment: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub ports: Vec<PortBinding>,
    pub labels: BTreeMap<String, String>,
    pub network: Option<String>,
    pub hostname: Option<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
}

/// Handle to a container created by [`ContainerRuntime::create_and_start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Exit status and combined output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capabilities the orchestration core consumes from a container runtime.
///
/// Implementations must be safe to share between the per-service workers;
/// each call is independent and may block for as long as the daemon takes.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verify that the daemon is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Start pulling `image`, streaming status events until the pull finishes.
    async fn pull_image(&self, image: &str) -> Result<PullStream, RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn create_and_start(&self, spec: &ContainerSpec)
        -> Result<ContainerHandle, RuntimeError>;

    /// Inspect a container by name. `Ok(None)` means it does not exist.
    ///
    /// For exited containers the last `log_tail` lines are attached.
    async fn inspect(
        &self,
        container: &str,
        log_tail: usize,
    ) -> Result<Option<ContainerState>, RuntimeError>;

    /// Last `tail` lines of a container's combined stdout/stderr.
    async fn logs(&self, container: &str, tail: usize) -> Result<String, RuntimeError>;

    /// Stop a container. Fails with [`RuntimeError::ContainerNotFound`] if absent.
    async fn stop(&self, container: &str) -> Result<(), RuntimeError>;

    /// Remove a stopped container. Fails with [`RuntimeError::ContainerNotFound`] if absent.
    async fn remove(&self, container: &str) -> Result<(), RuntimeError>;

    /// Run a shell command inside a running container.
    async fn exec_run(
        &self,
        container: &str,
        command: &str,
        user: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError>;

    /// Run a container to completion and remove it afterwards.
    async fn run_oneshot(&self, spec: &ContainerSpec) -> Result<ExecOutput, RuntimeError>;

    async fn network_create_if_absent(&self, name: &str) -> Result<(), RuntimeError>;

    async fn network_connect(
        &self,
        container: &ContainerHandle,
        network: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_status() {
        assert_eq!(ContainerStatus::parse("running\n"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("exited"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::parse("whatever"), ContainerStatus::Unknown);
        assert!(ContainerStatus::Dead.is_exited());
        assert!(!ContainerStatus::Restarting.is_exited());
    }

    #[test]
    fn test_pull_event_display() {
        assert_eq!(PullEvent::new("Pulling fs layer").to_string(), "Pulling fs layer");
        assert_eq!(
            PullEvent::new("Downloading")
                .with_progress("[==>  ] 3MB/9MB")
                .to_string(),
            "Downloading : [==>  ] 3MB/9MB"
        );
    }
}
