//! Start/stop state machine for a single service.

use super::results::{ResultError, ResultSender};
use crate::config::{EngineSettings, Project, Service};
use crate::docker::{self, LABEL_MAIN, LABEL_PROJECT, LABEL_SERVICE};
use crate::runtime::{ContainerRuntime, ContainerSpec, Mount, PortBinding, RuntimeError};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Additional container settings contributed by something other than the
/// service definition itself, e.g. a database driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOverlay {
    pub mounts: Vec<Mount>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<PortBinding>,
}

impl ServiceOverlay {
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty() && self.environment.is_empty() && self.ports.is_empty()
    }
}

/// How a start run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Done,
    Cancelled,
}

/// Runs the start and stop state machines of one service against a runtime,
/// reporting every transition into the service's result channel.
///
/// Failures never escape as `Err`: they end the channel with a
/// [`ResultError`] instead.
pub struct ServiceLifecycleController {
    runtime: Arc<dyn ContainerRuntime>,
    project: Arc<Project>,
    service: Service,
    settings: Arc<EngineSettings>,
    overlay: ServiceOverlay,
    cancel: CancellationToken,
}

impl ServiceLifecycleController {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        project: Arc<Project>,
        service: Service,
        settings: Arc<EngineSettings>,
        cancel: CancellationToken,
    ) -> Self {
        ServiceLifecycleController {
            runtime,
            project,
            service,
            settings,
            overlay: ServiceOverlay::default(),
            cancel,
        }
    }

    pub fn with_overlay(mut self, overlay: ServiceOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn container_name(&self) -> String {
        docker::container_name(&self.project.name, &self.service.name)
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Start the service unless it is already running.
    ///
    /// With `quick`, pre- and post-start commands are skipped.
    pub async fn start(&self, quick: bool, mut tx: ResultSender) {
        match self.try_start(quick, &mut tx).await {
            Ok(Flow::Done) => tx.end(),
            Ok(Flow::Cancelled) => {
                tracing::debug!("Start of '{}' interrupted", self.service.name);
            }
            Err(err) => tx.end_with_error(err),
        }
    }

    async fn try_start(&self, quick: bool, tx: &mut ResultSender) -> Result<Flow, ResultError> {
        let name = self.container_name();

        tx.step(1, None, "Checking...");
        let existing = self
            .runtime
            .inspect(&name, self.settings.log_tail_lines)
            .await
            .map_err(|e| ResultError::new("Error checking container status").with_cause(e))?;

        match existing {
            Some(state) if state.status.is_exited() => {
                tracing::debug!("Removing leftover container {} ({})", name, state.status);
                match self.runtime.remove(&name).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        return Err(ResultError::new("Error removing the old container")
                            .with_cause(e))
                    }
                }
            }
            // Anything not exited is treated as already started.
            Some(_) => {
                tx.step(2, Some(2), "Already started!");
                return Ok(Flow::Done);
            }
            None => {}
        }

        let (pre_start, post_start): (&[String], &[String]) = if quick {
            (&[], &[])
        } else {
            (&self.service.pre_start, &self.service.post_start)
        };
        let total = 5 + pre_start.len() + post_start.len();
        let mut current = 2;

        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        if self.pull_image(current, total, tx).await? == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }

        for (index, command) in pre_start.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            current += 1;
            tx.step(
                current,
                Some(total),
                format!("Running pre-start command {}/{}...", index + 1, pre_start.len()),
            );
            if let Err(err) = self.run_pre_start(command).await {
                return Err(self.rollback(err).await);
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        current += 1;
        tx.step(current, Some(total), "Starting container...");
        if let Err(err) = self.create_container().await {
            return Err(self.rollback(err).await);
        }

        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        current += 1;
        tx.step(current, Some(total), "Verifying health...");
        tokio::select! {
            _ = self.cancel.cancelled() => return Ok(Flow::Cancelled),
            _ = tokio::time::sleep(self.settings.health_check_delay()) => {}
        }
        if let Err(err) = self.verify_started(&name).await {
            return Err(self.rollback(err).await);
        }

        for (index, command) in post_start.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            current += 1;
            tx.step(
                current,
                Some(total),
                format!("Running post-start command {}/{}...", index + 1, post_start.len()),
            );
            if let Err(err) = self.run_post_start(&name, command).await {
                return Err(self.rollback(err).await);
            }
        }

        tx.step(total, Some(total), "Started!");
        Ok(Flow::Done)
    }

    /// Pull the image, forwarding every status line as a repeat of `step`.
    ///
    /// If the pull fails but the image is present locally, start continues.
    async fn pull_image(
        &self,
        step: usize,
        total: usize,
        tx: &mut ResultSender,
    ) -> Result<Flow, ResultError> {
        let image = &self.service.image;
        tx.step(step, Some(total), "Pulling image...");

        let pulled = match self.runtime.pull_image(image).await {
            Ok(mut events) => {
                let mut outcome = Ok(());
                loop {
                    let event = tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(Flow::Cancelled),
                        event = events.next() => event,
                    };
                    match event {
                        Some(Ok(event)) => {
                            tx.step(step, Some(total), format!("Pulling image... {}", event));
                        }
                        Some(Err(e)) => {
                            outcome = Err(e);
                            break;
                        }
                        None => break,
                    }
                }
                outcome
            }
            Err(e) => Err(e),
        };

        if let Err(pull_err) = pulled {
            match self.runtime.image_exists(image).await {
                Ok(true) => {
                    tracing::warn!(
                        "Pulling {} failed, using the local image instead: {}",
                        image,
                        pull_err
                    );
                }
                _ => {
                    return Err(ResultError::new(format!("Error pulling the image {}", image))
                        .with_cause(pull_err));
                }
            }
        }
        Ok(Flow::Done)
    }

    async fn run_pre_start(&self, command: &str) -> Result<(), ResultError> {
        let mut spec = self.base_spec()?;
        spec.name = docker::oneshot_container_name(&self.project.name, &self.service.name, "pre_start");
        spec.entrypoint = Some(vec!["/bin/sh".to_string(), "-c".to_string()]);
        spec.command = Some(vec![command.to_string()]);
        spec.labels.insert(LABEL_MAIN.to_string(), "0".to_string());
        spec.ports.clear();

        let output = self.runtime.run_oneshot(&spec).await.map_err(|e| {
            ResultError::new(format!("Error running pre-start command '{}'", command)).with_cause(e)
        })?;
        if !output.success() {
            return Err(ResultError::new(format!(
                "Pre-start command '{}' failed with exit code {}",
                command, output.exit_code
            ))
            .with_details(output.output));
        }
        Ok(())
    }

    async fn run_post_start(&self, container: &str, command: &str) -> Result<(), ResultError> {
        let user = self.command_user();
        let output = self
            .runtime
            .exec_run(container, command, user.as_deref())
            .await
            .map_err(|e| {
                ResultError::new(format!("Error running post-start command '{}'", command))
                    .with_cause(e)
            })?;
        if !output.success() {
            return Err(ResultError::new(format!(
                "Post-start command '{}' failed with exit code {}",
                command, output.exit_code
            ))
            .with_details(output.output));
        }
        Ok(())
    }

    async fn create_container(&self) -> Result<(), ResultError> {
        let mut spec = self.base_spec()?;
        // Attached to the project network afterwards so the aliases apply.
        spec.network = None;
        spec.user = None;
        spec.command = self.service.command.as_ref().map(|c| c.to_args());

        let handle = self
            .runtime
            .create_and_start(&spec)
            .await
            .map_err(|e| ResultError::new("Error starting the container").with_cause(e))?;

        let aliases = vec![
            self.service.name.clone(),
            format!("{}.{}", self.service.name, self.project.name),
        ];
        self.runtime
            .network_connect(&handle, &docker::network_name(&self.project.name), &aliases)
            .await
            .map_err(|e| {
                ResultError::new("Error connecting the container to the project network")
                    .with_cause(e)
            })
    }

    async fn verify_started(&self, container: &str) -> Result<(), ResultError> {
        let state = self
            .runtime
            .inspect(container, self.settings.log_tail_lines)
            .await
            .map_err(|e| ResultError::new("Error checking container status").with_cause(e))?;

        match state {
            None => Err(ResultError::new("Container went missing")),
            Some(state) if state.status.is_exited() => {
                let mut err = ResultError::new(match state.exit_code {
                    Some(code) => format!("Container crashed with exit code {}", code),
                    None => "Container crashed".to_string(),
                });
                if let Some(logs) = state.log_tail {
                    err = err.with_details(logs);
                }
                Err(err)
            }
            Some(_) => Ok(()),
        }
    }

    /// Best-effort stop after a failed start. Errors are logged, never reported.
    async fn rollback(&self, err: ResultError) -> ResultError {
        let name = self.container_name();
        tracing::debug!("Rolling back start of '{}': {}", self.service.name, err);
        if let Err(e) = self.stop_container(&name).await {
            if !e.is_not_found() {
                tracing::warn!("Rollback of '{}' failed: {}", self.service.name, e);
            }
        }
        err
    }

    // ========================================================================
    // Stop
    // ========================================================================

    /// Stop and remove the service container. A missing container is success.
    pub async fn stop(&self, mut tx: ResultSender) {
        match self.try_stop(&mut tx).await {
            Ok(Flow::Done) => tx.end(),
            Ok(Flow::Cancelled) => {
                tracing::debug!("Stop of '{}' interrupted", self.service.name);
            }
            Err(err) => tx.end_with_error(err),
        }
    }

    async fn try_stop(&self, tx: &mut ResultSender) -> Result<Flow, ResultError> {
        let name = self.container_name();

        tx.step(1, Some(4), "Checking...");
        let existing = self
            .runtime
            .inspect(&name, 0)
            .await
            .map_err(|e| ResultError::new("Error checking container status").with_cause(e))?;
        if existing.is_none() {
            tx.step(2, Some(2), "Already stopped!");
            return Ok(Flow::Done);
        }

        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        tx.step(2, Some(4), "Stopping...");
        match self.runtime.stop(&name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tx.step(4, Some(4), "Already stopped!");
                return Ok(Flow::Done);
            }
            Err(e) => return Err(ResultError::new("Error stopping the container").with_cause(e)),
        }

        if self.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        tx.step(3, Some(4), "Removing...");
        match self.runtime.remove(&name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ResultError::new("Error removing the container").with_cause(e)),
        }

        tx.step(4, Some(4), "Stopped!");
        Ok(Flow::Done)
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        match self.runtime.stop(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
        match self.runtime.remove(name).await {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Container spec
    // ========================================================================

    /// Spec shared by the service container and its pre-start containers.
    fn base_spec(&self) -> Result<ContainerSpec, ResultError> {
        let mut mounts = self
            .service
            .mounts(self.project.folder())
            .map_err(|e| ResultError::new("Invalid volume configuration").with_cause(e))?;
        mounts.extend(self.overlay.mounts.iter().cloned());

        let mut environment = self.service.environment.clone();
        environment.extend(self.overlay.environment.clone());

        let mut ports = self.service.port_bindings();
        ports.extend(self.overlay.ports.iter().copied());

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_PROJECT.to_string(), self.project.name.clone());
        labels.insert(LABEL_SERVICE.to_string(), self.service.name.clone());
        let main = if self.service.is_main() { "1" } else { "0" };
        labels.insert(LABEL_MAIN.to_string(), main.to_string());

        Ok(ContainerSpec {
            name: self.container_name(),
            image: self.service.image.clone(),
            entrypoint: None,
            command: None,
            environment,
            mounts,
            ports,
            labels,
            network: Some(docker::network_name(&self.project.name)),
            hostname: Some(self.service.name.clone()),
            working_dir: self.service.working_directory.clone(),
            user: self.command_user(),
        })
    }

    /// `uid:gid` of the invoking user, unless the service runs as root.
    fn command_user(&self) -> Option<String> {
        if self.service.run_as_root || !self.settings.run_as_current_user {
            return None;
        }
        Some(current_user())
    }
}

pub(crate) fn current_user() -> String {
    format!("{}:{}", nix::unistd::getuid(), nix::unistd::getgid())
}
