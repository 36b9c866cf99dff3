use crate::config::{Project, Service};
use crate::docker;
use crate::runtime::{ContainerRuntime, ContainerState, ContainerStatus, RuntimeError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    /// Created or restarting, not yet settled.
    Starting,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Running => "running",
            ServiceState::Starting => "starting",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Point-in-time status of one service container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service: String,
    pub container: String,
    pub state: ServiceState,
    /// `None` when no container exists.
    pub details: Option<ContainerState>,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        self.state != ServiceState::Stopped
    }
}

pub(crate) fn classify(state: Option<&ContainerState>) -> ServiceState {
    match state.map(|s| s.status) {
        None => ServiceState::Stopped,
        Some(status) if status.is_exited() => ServiceState::Stopped,
        Some(ContainerStatus::Created) | Some(ContainerStatus::Restarting) => ServiceState::Starting,
        Some(_) => ServiceState::Running,
    }
}

/// Inspect the container of `service`.
pub async fn service_status(
    runtime: &dyn ContainerRuntime,
    project: &Project,
    service: &Service,
) -> Result<ServiceStatus, RuntimeError> {
    let container = docker::container_name(&project.name, &service.name);
    let details = runtime.inspect(&container, 0).await?;
    Ok(ServiceStatus {
        service: service.name.clone(),
        state: classify(details.as_ref()),
        container,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: ContainerStatus) -> ContainerState {
        ContainerState {
            status,
            exit_code: None,
            log_tail: None,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(None), ServiceState::Stopped);
        assert_eq!(classify(Some(&state(ContainerStatus::Exited))), ServiceState::Stopped);
        assert_eq!(classify(Some(&state(ContainerStatus::Created))), ServiceState::Starting);
        assert_eq!(classify(Some(&state(ContainerStatus::Running))), ServiceState::Running);
        assert_eq!(classify(Some(&state(ContainerStatus::Paused))), ServiceState::Running);
    }
}
