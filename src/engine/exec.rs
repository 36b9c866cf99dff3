//! One-off commands, run inside a service container or in a throwaway
//! container for a project command.

use super::project::ProjectOrchestrator;
use super::service::current_user;
use crate::config::{EngineSettings, Project, ProjectCommand};
use crate::docker::{self, LABEL_PROJECT};
use crate::error::{Error, Result};
use crate::runtime::{ContainerSpec, ContainerStatus, ExecOutput};
use std::collections::BTreeMap;

impl ProjectOrchestrator {
    /// Run `command` with `sh -c` in the running container of `service`.
    ///
    /// A non-zero exit code is not an error; it is returned in the output.
    pub async fn exec(
        &self,
        project: &Project,
        service: &str,
        command: &str,
    ) -> Result<ExecOutput> {
        let service = project.service(service)?;
        self.runtime().ping().await?;

        let container = docker::container_name(&project.name, &service.name);
        let running = self
            .runtime()
            .inspect(&container, 0)
            .await?
            .is_some_and(|state| state.status == ContainerStatus::Running);
        if !running {
            return Err(Error::ServiceNotRunning(service.name.clone()));
        }

        let user = run_as(self.settings(), service.run_as_root);
        tracing::debug!("Running '{}' in {}", command, container);
        Ok(self
            .runtime()
            .exec_run(&container, command, user.as_deref())
            .await?)
    }

    /// Run the project command `name` with `args` appended.
    ///
    /// The container joins the project network and is removed afterwards.
    pub async fn run_command(
        &self,
        project: &Project,
        name: &str,
        args: &[String],
    ) -> Result<ExecOutput> {
        let command = project.command(name)?;
        self.runtime().ping().await?;
        self.runtime()
            .network_create_if_absent(&docker::network_name(&project.name))
            .await?;

        let user = run_as(self.settings(), command.run_as_root);
        let spec = command_spec(project, command, args, user)?;
        tracing::debug!("Running command '{}' in {}", name, spec.name);
        Ok(self.runtime().run_oneshot(&spec).await?)
    }
}

fn run_as(settings: &EngineSettings, run_as_root: bool) -> Option<String> {
    (!run_as_root && settings.run_as_current_user).then(current_user)
}

fn command_spec(
    project: &Project,
    command: &ProjectCommand,
    args: &[String],
    user: Option<String>,
) -> Result<ContainerSpec> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_PROJECT.to_string(), project.name.clone());

    Ok(ContainerSpec {
        name: docker::command_container_name(&project.name, &command.name),
        image: command.image.clone(),
        entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        command: Some(vec![command.command_line(args)]),
        environment: command.environment.clone(),
        mounts: command.mounts(project.folder())?,
        ports: Vec::new(),
        labels,
        network: Some(docker::network_name(&project.name)),
        hostname: None,
        working_dir: command.working_directory.clone(),
        user,
    })
}
