//! Centralized Docker CLI client.
//!
//! All Docker CLI interactions go through `DockerClient`, which provides
//! consistent error mapping to [`RuntimeError`] and a single point where
//! `Command::new("docker")` is constructed.

use crate::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus,
    ExecOutput, PullEvent, PullStream, RuntimeError,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Timeout for short control commands (inspect, network lookups, info).
const DOCKER_CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const DOCKER_PING_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Exit code `docker run` uses when the daemon itself rejected the request.
const DOCKER_RUN_DAEMON_ERROR: i32 = 125;

/// Docker CLI backed implementation of [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct DockerClient {
    stop_grace_secs: u64,
}

impl DockerClient {
    pub fn new() -> Self {
        DockerClient {
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
        }
    }

    /// Seconds `docker stop` waits before killing the container.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_secs = grace.as_secs().max(1);
        self
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Run a docker command with a timeout, returning raw Output.
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output, RuntimeError> {
        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new("docker").args(args).output(),
        )
        .await;

        let cmd_str = format!("docker {}", args.join(" "));

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RuntimeError::exec_failed(cmd_str, e)),
            Err(_) => Err(RuntimeError::timeout(cmd_str, timeout)),
        }
    }

    /// Run a docker command without a timeout. Used for calls whose duration
    /// depends on user workloads (container runs, exec, stop).
    async fn run_unbounded(&self, args: &[String]) -> Result<Output, RuntimeError> {
        let cmd_str = format!("docker {}", args.join(" "));
        tokio::process::Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::exec_failed(cmd_str, e))
    }

    /// Map a failed invocation onto the most specific error variant.
    fn classify_failure(command: &str, output: &Output, container: &str) -> RuntimeError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") || stderr.contains("No such object") {
            return RuntimeError::not_found(container);
        }
        if stderr.contains("Cannot connect to the Docker daemon")
            || stderr.contains("Is the docker daemon running")
        {
            return RuntimeError::DaemonUnavailable;
        }
        RuntimeError::failed(command, output)
    }

    fn combined_output(output: &Output) -> String {
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }

    /// Translate a [`ContainerSpec`] into `docker run` arguments (without the
    /// leading `run` and mode flags).
    pub(crate) fn spec_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["--name".to_string(), spec.name.clone()];

        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        for (key, value) in &spec.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        for mount in &spec.mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.push("-v".to_string());
            args.push(format!(
                "{}:{}:{}",
                mount.host.display(),
                mount.container,
                mode
            ));
        }

        // Bind to loopback only; dev services are not meant to be reachable from outside.
        for port in &spec.ports {
            args.push("-p".to_string());
            args.push(format!("127.0.0.1:{}:{}", port.host, port.container));
        }

        if let Some(ref network) = spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        if let Some(ref hostname) = spec.hostname {
            args.push("--hostname".to_string());
            args.push(hostname.clone());
        }
        if let Some(ref dir) = spec.working_dir {
            args.push("--workdir".to_string());
            args.push(dir.clone());
        }
        if let Some(ref user) = spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        // docker only accepts a single entrypoint binary; further elements are
        // prepended to the command.
        let mut trailing = Vec::new();
        if let Some(ref entrypoint) = spec.entrypoint {
            if let Some((first, rest)) = entrypoint.split_first() {
                args.push("--entrypoint".to_string());
                args.push(first.clone());
                trailing.extend(rest.iter().cloned());
            }
        }

        args.push(spec.image.clone());
        args.extend(trailing);
        if let Some(ref command) = spec.command {
            args.extend(command.iter().cloned());
        }
        args
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// State threaded through the pull event stream.
struct PullState {
    lines: tokio::io::Lines<BufReader<tokio::process::ChildStdout>>,
    child: Option<tokio::process::Child>,
    command: String,
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let output = self
            .run(&["info", "--format", "{{.ServerVersion}}"], DOCKER_PING_TIMEOUT)
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            tracing::debug!(
                "docker info failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Err(RuntimeError::DaemonUnavailable)
        }
    }

    async fn pull_image(&self, image: &str) -> Result<PullStream, RuntimeError> {
        let command = format!("docker pull {}", image);
        let mut child = tokio::process::Command::new("docker")
            .args(["pull", image])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::exec_failed(&command, e))?;

        let stdout = child.stdout.take().ok_or_else(|| RuntimeError::Malformed {
            command: command.clone(),
            output: "stdout not captured".to_string(),
        })?;

        let state = PullState {
            lines: BufReader::new(stdout).lines(),
            child: Some(child),
            command,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            st.child.as_ref()?;
            loop {
                match st.lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let event = match line.split_once(": ") {
                            Some((layer, status)) if !layer.contains(' ') => {
                                PullEvent::new(status.trim()).with_progress(layer.trim())
                            }
                            _ => PullEvent::new(line.trim()),
                        };
                        return Some((Ok(event), st));
                    }
                    Ok(None) | Err(_) => {
                        let child = st.child.take()?;
                        return match child.wait_with_output().await {
                            Ok(output) if output.status.success() => None,
                            Ok(output) => {
                                let err = DockerClient::classify_failure(&st.command, &output, "");
                                Some((Err(err), st))
                            }
                            Err(e) => {
                                let err = RuntimeError::exec_failed(st.command.clone(), e);
                                Some((Err(err), st))
                            }
                        };
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self
            .run(&["image", "inspect", image], DOCKER_CONTROL_TIMEOUT)
            .await
        {
            Ok(o) => Ok(o.status.success()),
            Err(RuntimeError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_and_start(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ContainerHandle, RuntimeError> {
        let mut args = vec!["run".to_string(), "-d".to_string()];
        args.extend(Self::spec_args(spec));
        let output = self.run_unbounded(&args).await?;
        if !output.status.success() {
            return Err(Self::classify_failure("docker run -d", &output, &spec.name));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(RuntimeError::Malformed {
                command: "docker run -d".to_string(),
                output: "no container id returned".to_string(),
            });
        }
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn inspect(
        &self,
        container: &str,
        log_tail: usize,
    ) -> Result<Option<ContainerState>, RuntimeError> {
        let output = self
            .run(
                &[
                    "inspect",
                    "--type=container",
                    "-f",
                    "{{.State.Status}}|{{.State.ExitCode}}",
                    container,
                ],
                DOCKER_CONTROL_TIMEOUT,
            )
            .await?;

        if !output.status.success() {
            return match Self::classify_failure("docker inspect", &output, container) {
                RuntimeError::ContainerNotFound { .. } => Ok(None),
                other => Err(other),
            };
        }

        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let Some((status, exit_code)) = raw.split_once('|') else {
            return Err(RuntimeError::Malformed {
                command: "docker inspect".to_string(),
                output: raw,
            });
        };
        let status = ContainerStatus::parse(status);
        let exit_code = exit_code.trim().parse::<i32>().ok();

        let log_tail = if status.is_exited() {
            match self.logs(container, log_tail).await {
                Ok(logs) => Some(logs),
                Err(e) => {
                    tracing::debug!("Failed to fetch logs for {}: {}", container, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Some(ContainerState {
            status,
            exit_code,
            log_tail,
        }))
    }

    async fn logs(&self, container: &str, tail: usize) -> Result<String, RuntimeError> {
        let tail = tail.to_string();
        let output = self
            .run(&["logs", "--tail", &tail, container], DOCKER_CONTROL_TIMEOUT)
            .await?;
        if !output.status.success() {
            return Err(Self::classify_failure("docker logs", &output, container));
        }
        Ok(Self::combined_output(&output))
    }

    async fn stop(&self, container: &str) -> Result<(), RuntimeError> {
        let args = vec![
            "stop".to_string(),
            "-t".to_string(),
            self.stop_grace_secs.to_string(),
            container.to_string(),
        ];
        let output = self.run_unbounded(&args).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(Self::classify_failure("docker stop", &output, container))
    }

    async fn remove(&self, container: &str) -> Result<(), RuntimeError> {
        let output = self
            .run(&["rm", "-f", container], DOCKER_CONTROL_TIMEOUT)
            .await?;
        if output.status.success() {
            return Ok(());
        }
        Err(Self::classify_failure("docker rm", &output, container))
    }

    async fn exec_run(
        &self,
        container: &str,
        command: &str,
        user: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec".to_string()];
        if let Some(user) = user {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        args.extend([
            container.to_string(),
            "/bin/sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        let output = self.run_unbounded(&args).await?;
        if !output.status.success() {
            if let err @ (RuntimeError::ContainerNotFound { .. } | RuntimeError::DaemonUnavailable) =
                Self::classify_failure("docker exec", &output, container)
            {
                return Err(err);
            }
        }
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: Self::combined_output(&output),
        })
    }

    async fn run_oneshot(&self, spec: &ContainerSpec) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        args.extend(Self::spec_args(spec));
        let output = self.run_unbounded(&args).await?;
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code == DOCKER_RUN_DAEMON_ERROR {
            return Err(Self::classify_failure("docker run --rm", &output, &spec.name));
        }
        Ok(ExecOutput {
            exit_code,
            output: Self::combined_output(&output),
        })
    }

    async fn network_create_if_absent(&self, name: &str) -> Result<(), RuntimeError> {
        let inspect = self
            .run(&["network", "inspect", name], DOCKER_CONTROL_TIMEOUT)
            .await?;
        if inspect.status.success() {
            return Ok(());
        }

        let output = self
            .run(
                &["network", "create", "--driver", "bridge", "--attachable", name],
                DOCKER_CONTROL_TIMEOUT,
            )
            .await?;
        if output.status.success() {
            tracing::debug!("Created network {}", name);
            return Ok(());
        }
        // Another process created it between our inspect and create.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("already exists") {
            return Ok(());
        }
        Err(Self::classify_failure("docker network create", &output, name))
    }

    async fn network_connect(
        &self,
        container: &ContainerHandle,
        network: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError> {
        let mut args = vec!["network".to_string(), "connect".to_string()];
        for alias in aliases {
            args.push("--alias".to_string());
            args.push(alias.clone());
        }
        args.push(network.to_string());
        args.push(container.id.clone());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs, DOCKER_CONTROL_TIMEOUT).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(Self::classify_failure(
            "docker network connect",
            &output,
            &container.name,
        ))
    }
}
