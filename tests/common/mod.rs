// Shared helpers for integration tests.
//
// `FakeRuntime` is an in-memory container runtime. It tracks containers by
// name, records every call, and can be scripted to fail individual steps.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use riptide::engine::{BatchReport, MultiResultStream, ServiceEvent};
use riptide::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus,
    ExecOutput, PullEvent, PullStream, RuntimeError,
};
use riptide::{EngineSettings, Project, ProjectOrchestrator, Service};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, ContainerState>,
    specs: HashMap<String, ContainerSpec>,
    networks: HashSet<String>,
    calls: Vec<String>,
    /// Commands (pre- or post-start) containing one of these fragments exit 1.
    failing_commands: Vec<String>,
    /// Images whose container exits right after being started.
    crashing_images: HashSet<String>,
    /// Images whose pull never yields an event.
    stalled_pulls: HashSet<String>,
    /// Images whose pull fails.
    failing_pulls: HashSet<String>,
    local_images: HashSet<String>,
    daemon_down: bool,
    /// Tokens cancelled as soon as a call starting with the prefix is made.
    cancel_triggers: Vec<(String, CancellationToken)>,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_command(&self, fragment: &str) {
        self.state.lock().failing_commands.push(fragment.to_string());
    }

    pub fn crash_image(&self, image: &str) {
        self.state.lock().crashing_images.insert(image.to_string());
    }

    pub fn stall_pull(&self, image: &str) {
        self.state.lock().stalled_pulls.insert(image.to_string());
    }

    pub fn fail_pull(&self, image: &str, present_locally: bool) {
        let mut state = self.state.lock();
        state.failing_pulls.insert(image.to_string());
        if present_locally {
            state.local_images.insert(image.to_string());
        }
    }

    /// Cancel `token` once a call starting with `prefix` has been recorded.
    ///
    /// The call itself still completes normally.
    pub fn cancel_on(&self, prefix: &str, token: CancellationToken) {
        self.state
            .lock()
            .cancel_triggers
            .push((prefix.to_string(), token));
    }

    pub fn set_daemon_down(&self) {
        self.state.lock().daemon_down = true;
    }

    /// Pretend a container already exists in `status`.
    pub fn put_container(&self, name: &str, status: ContainerStatus) {
        self.state.lock().containers.insert(
            name.to_string(),
            ContainerState {
                status,
                exit_code: status.is_exited().then_some(0),
                log_tail: None,
            },
        );
    }

    pub fn container(&self, name: &str) -> Option<ContainerState> {
        self.state.lock().containers.get(name).cloned()
    }

    /// Spec the container was last created or run with.
    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.state.lock().specs.get(name).cloned()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().networks.contains(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls whose description starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        let mut state = self.state.lock();
        for (prefix, token) in &state.cancel_triggers {
            if call.starts_with(prefix.as_str()) {
                token.cancel();
            }
        }
        state.calls.push(call);
    }

    fn command_result(&self, command: &str) -> ExecOutput {
        let state = self.state.lock();
        if state.failing_commands.iter().any(|f| command.contains(f)) {
            ExecOutput {
                exit_code: 1,
                output: format!("{}: command failed", command),
            }
        } else {
            ExecOutput {
                exit_code: 0,
                output: String::new(),
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        if self.state.lock().daemon_down {
            return Err(RuntimeError::DaemonUnavailable);
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<PullStream, RuntimeError> {
        self.record(format!("pull {}", image));
        let state = self.state.lock();
        if state.stalled_pulls.contains(image) {
            return Ok(futures::stream::pending().boxed());
        }
        if state.failing_pulls.contains(image) {
            return Err(RuntimeError::cmd_failed(
                format!("docker pull {}", image),
                "manifest unknown",
                Some(1),
            ));
        }
        Ok(futures::stream::iter(vec![
            Ok(PullEvent::new("Pulling fs layer")),
            Ok(PullEvent::new("Download complete")),
        ])
        .boxed())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.state.lock().local_images.contains(image))
    }

    async fn create_and_start(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ContainerHandle, RuntimeError> {
        self.record(format!("create {}", spec.name));
        let mut state = self.state.lock();
        let crashes = state.crashing_images.contains(&spec.image);
        let container = if crashes {
            ContainerState {
                status: ContainerStatus::Exited,
                exit_code: Some(3),
                log_tail: Some("fatal: cannot bind".to_string()),
            }
        } else {
            ContainerState::running()
        };
        state.containers.insert(spec.name.clone(), container);
        state.specs.insert(spec.name.clone(), spec.clone());
        Ok(ContainerHandle {
            id: format!("id-{}", spec.name),
            name: spec.name.clone(),
        })
    }

    async fn inspect(
        &self,
        container: &str,
        _log_tail: usize,
    ) -> Result<Option<ContainerState>, RuntimeError> {
        self.record(format!("inspect {}", container));
        Ok(self.state.lock().containers.get(container).cloned())
    }

    async fn logs(&self, container: &str, _tail: usize) -> Result<String, RuntimeError> {
        match self.state.lock().containers.get(container) {
            Some(state) => Ok(state.log_tail.clone().unwrap_or_default()),
            None => Err(RuntimeError::not_found(container)),
        }
    }

    async fn stop(&self, container: &str) -> Result<(), RuntimeError> {
        self.record(format!("stop {}", container));
        match self.state.lock().containers.get_mut(container) {
            Some(state) => {
                state.status = ContainerStatus::Exited;
                state.exit_code = Some(0);
                Ok(())
            }
            None => Err(RuntimeError::not_found(container)),
        }
    }

    async fn remove(&self, container: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove {}", container));
        match self.state.lock().containers.remove(container) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::not_found(container)),
        }
    }

    async fn exec_run(
        &self,
        container: &str,
        command: &str,
        user: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError> {
        self.record(format!(
            "exec {} {} as {}",
            container,
            command,
            user.unwrap_or("root")
        ));
        if !self.state.lock().containers.contains_key(container) {
            return Err(RuntimeError::not_found(container));
        }
        Ok(self.command_result(command))
    }

    async fn run_oneshot(&self, spec: &ContainerSpec) -> Result<ExecOutput, RuntimeError> {
        let command = spec.command.clone().unwrap_or_default().join(" ");
        self.record(format!("oneshot {} {}", spec.image, command));
        self.state
            .lock()
            .specs
            .insert(spec.name.clone(), spec.clone());
        Ok(self.command_result(&command))
    }

    async fn network_create_if_absent(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("network {}", name));
        self.state.lock().networks.insert(name.to_string());
        Ok(())
    }

    async fn network_connect(
        &self,
        container: &ContainerHandle,
        network: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError> {
        self.record(format!(
            "connect {} {} {}",
            container.name,
            network,
            aliases.join(",")
        ));
        Ok(())
    }
}

/// Settings with no health check delay so tests run instantly.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        health_check_delay: "0s".to_string(),
        ..EngineSettings::default()
    }
}

pub fn orchestrator(runtime: Arc<FakeRuntime>) -> ProjectOrchestrator {
    ProjectOrchestrator::new(runtime, fast_settings())
}

pub fn orchestrator_with(runtime: Arc<FakeRuntime>, settings: EngineSettings) -> ProjectOrchestrator {
    ProjectOrchestrator::new(runtime, settings)
}

/// A project with a web service, a plain service, and nothing database related.
pub fn web_project(folder: &std::path::Path) -> Project {
    let mut web = Service::new("web", "nginx:1.25");
    web.roles.insert("main".to_string());
    web.pre_start = vec!["echo prepare".to_string()];
    web.post_start = vec!["echo warm-cache".to_string()];
    Project::new("shop", folder)
        .with_service(web)
        .with_service(Service::new("mail", "mailhog/mailhog"))
}

/// Drain a batch, keeping every event alongside the report.
pub async fn collect(stream: MultiResultStream) -> (Vec<ServiceEvent>, BatchReport) {
    let mut events = Vec::new();
    let report = stream.fold_report(|e| events.push(e.clone())).await;
    (events, report)
}

pub fn events_for<'a>(events: &'a [ServiceEvent], service: &str) -> Vec<&'a ServiceEvent> {
    events.iter().filter(|e| e.service == service).collect()
}

pub fn is_docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

// Skip test if Docker is not available
#[macro_export]
macro_rules! require_docker {
    () => {
        if !common::is_docker_available() {
            eprintln!("Skipping test: Docker not available");
            return;
        }
    };
}
