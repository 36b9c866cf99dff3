use super::lifecycle::drive_batch;
use crate::cli::DbCommands;
use crate::output::UserOutput;
use anyhow::Context;
use riptide::db::{self, DbEnvironmentManager, EnvironmentError};
use riptide::engine::service_status;
use riptide::{DbDriver, Error, Project, ProjectOrchestrator, Service};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct EnvironmentList<'a> {
    current: &'a str,
    environments: &'a [String],
}

pub async fn run_db(
    command: &DbCommands,
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    verbose: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let service = db::db_service(project).ok_or_else(|| {
        Error::Config(format!(
            "Project '{}' has no service with the 'db' role and a database driver",
            project.name
        ))
    })?;
    let driver = orchestrator
        .drivers()
        .for_service(service)
        .map_err(Error::from)?
        .ok_or_else(|| Error::Config(format!("Service '{}' has no driver", service.name)))?;
    let manager = DbEnvironmentManager::new(project);
    let ctx = DbContext {
        orchestrator,
        project,
        service,
        driver: driver.as_ref(),
        manager: &manager,
        verbose,
        out,
    };

    match command {
        DbCommands::Status => ctx.status().await,
        DbCommands::List { current, json } => ctx.list(*current, *json),
        DbCommands::Switch { name } => ctx.switch(name).await,
        DbCommands::New { name, stay } => ctx.create(name, None, *stay).await,
        DbCommands::Copy { from, to, stay } => ctx.create(to, Some(from), *stay).await,
        DbCommands::Drop { name } => {
            manager.drop_environment(name).map_err(Error::from)?;
            out.success(&format!("Deleted database environment '{}'", name));
            Ok(())
        }
        DbCommands::Import { file } => ctx.import(file.as_deref()).await,
        DbCommands::Export { file } => ctx.export(file).await,
    }
}

struct DbContext<'a> {
    orchestrator: &'a ProjectOrchestrator,
    project: &'a Project,
    service: &'a Service,
    driver: &'a dyn DbDriver,
    manager: &'a DbEnvironmentManager,
    verbose: bool,
    out: &'a dyn UserOutput,
}

impl DbContext<'_> {
    async fn is_running(&self) -> anyhow::Result<bool> {
        let status =
            service_status(self.orchestrator.runtime().as_ref(), self.project, self.service)
                .await
                .map_err(Error::from)?;
        Ok(status.is_running())
    }

    async fn batch(&self, start: bool) -> anyhow::Result<()> {
        let services = vec![self.service.name.clone()];
        let stream = if start {
            self.orchestrator
                .start_project(self.project, &services, false)
                .await?
        } else {
            self.orchestrator.stop_project(self.project, &services).await?
        };
        let report = drive_batch(self.orchestrator, stream, self.verbose, self.out).await;
        if self.orchestrator.is_cancelled() {
            return Err(Error::Aborted.into());
        }
        if report.has_errors() {
            anyhow::bail!(
                "Failed to {} database service '{}'",
                if start { "start" } else { "stop" },
                self.service.name
            );
        }
        Ok(())
    }

    /// Run `op` with the database stopped, restarting it afterwards if it was
    /// running before. The restart also happens when `op` fails.
    async fn with_db_stopped<F>(&self, op: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let was_running = self.is_running().await?;
        if was_running {
            self.out.status(&format!("Stopping {}...", self.service.name));
            self.batch(false).await?;
        }
        let result = op();
        if was_running {
            self.out.status(&format!("Starting {}...", self.service.name));
            let restarted = self.batch(true).await;
            if let (Err(_), Err(restart)) = (&result, &restarted) {
                tracing::warn!("Restarting {} failed: {:#}", self.service.name, restart);
            }
            result?;
            return restarted;
        }
        result
    }

    async fn switch(&self, name: &str) -> anyhow::Result<()> {
        self.manager.path_for(name).map_err(Error::from)?;
        if !self.manager.exists(name) {
            return Err(Error::from(EnvironmentError::NotFound(name.to_string())).into());
        }
        self.with_db_stopped(|| Ok(self.manager.switch(name).map_err(Error::from)?))
            .await?;
        self.out
            .success(&format!("Switched to database environment '{}'", name));
        Ok(())
    }

    async fn create(&self, name: &str, copy_from: Option<&str>, stay: bool) -> anyhow::Result<()> {
        self.manager
            .new_environment(name, copy_from)
            .map_err(Error::from)?;
        match copy_from {
            Some(source) => self.out.success(&format!(
                "Copied database environment '{}' to '{}'",
                source, name
            )),
            None => self
                .out
                .success(&format!("Created database environment '{}'", name)),
        }
        if stay {
            return Ok(());
        }
        self.switch(name).await
    }

    async fn status(&self) -> anyhow::Result<()> {
        let current = self.manager.currently_selected().map_err(Error::from)?;
        let running = self.is_running().await?;
        self.out.status(&format!("Environment: {}", current));
        self.out.status(&format!(
            "Service:     {} ({})",
            self.service.name,
            if running { "running" } else { "stopped" }
        ));
        self.out.blank();
        let width = self
            .driver
            .collect_info()
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0);
        for (label, value) in self.driver.collect_info() {
            self.out
                .status(&format!("  {:<width$}  {}", label, value, width = width));
        }
        Ok(())
    }

    fn list(&self, current_only: bool, json: bool) -> anyhow::Result<()> {
        let current = self.manager.currently_selected().map_err(Error::from)?;
        let environments = self.manager.list().map_err(Error::from)?;

        if json {
            let payload = if current_only {
                serde_json::to_string(&current)?
            } else {
                serde_json::to_string_pretty(&EnvironmentList {
                    current: &current,
                    environments: &environments,
                })?
            };
            println!("{}", payload);
            return Ok(());
        }
        if current_only {
            println!("{}", current);
            return Ok(());
        }
        for name in &environments {
            let marker = if *name == current { "*" } else { " " };
            self.out.status(&format!("{} {}", marker, name));
        }
        Ok(())
    }

    async fn ensure_running(&self) -> anyhow::Result<()> {
        if !self.is_running().await? {
            self.out.status(&format!("Starting {}...", self.service.name));
            self.batch(true).await?;
        }
        Ok(())
    }

    async fn import(&self, file: Option<&Path>) -> anyhow::Result<()> {
        let file = match file {
            Some(file) => file.to_path_buf(),
            None => prompt_path(&self.driver.prompt_for_import_path())?,
        };
        let file = std::fs::canonicalize(&file)
            .with_context(|| format!("Cannot read import file '{}'", file.display()))?;

        self.ensure_running().await?;
        self.out.status(&format!(
            "Importing {} into '{}'...",
            file.display(),
            self.manager.currently_selected().map_err(Error::from)?
        ));
        self.driver
            .import_from(self.orchestrator.runtime().as_ref(), self.project, &file)
            .await
            .map_err(Error::from)?;
        self.out.success("Import finished");
        Ok(())
    }

    async fn export(&self, file: &Path) -> anyhow::Result<()> {
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            std::env::current_dir()?.join(file)
        };
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.ensure_running().await?;
        self.out.status(&format!("Exporting to {}...", file.display()));
        self.driver
            .export_to(self.orchestrator.runtime().as_ref(), self.project, &file)
            .await
            .map_err(Error::from)?;
        self.out.success("Export finished");
        Ok(())
    }
}

fn prompt_path(prompt: &str) -> anyhow::Result<PathBuf> {
    println!("{}", prompt);
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::Aborted.into());
    }
    Ok(PathBuf::from(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::QuietOutput;
    use async_trait::async_trait;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use riptide::config::DriverConfig;
    use riptide::runtime::{
        ContainerHandle, ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus,
        ExecOutput, PullStream, RuntimeError,
    };
    use riptide::EngineSettings;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    const DB: &str = "riptide__shop__db";

    /// Tracks container status by name and records stop/start calls.
    #[derive(Default)]
    struct Containers {
        status: Mutex<HashMap<String, ContainerStatus>>,
        calls: Mutex<Vec<String>>,
    }

    impl Containers {
        fn calls_to(&self, prefix: &str) -> usize {
            self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
        }

        fn status_of(&self, name: &str) -> Option<ContainerStatus> {
            self.status.lock().get(name).copied()
        }
    }

    #[async_trait]
    impl ContainerRuntime for Containers {
        async fn ping(&self) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn pull_image(&self, _image: &str) -> Result<PullStream, RuntimeError> {
            Ok(futures::stream::empty().boxed())
        }

        async fn image_exists(&self, _image: &str) -> Result<bool, RuntimeError> {
            Ok(true)
        }

        async fn create_and_start(
            &self,
            spec: &ContainerSpec,
        ) -> Result<ContainerHandle, RuntimeError> {
            self.calls.lock().push(format!("create {}", spec.name));
            self.status
                .lock()
                .insert(spec.name.clone(), ContainerStatus::Running);
            Ok(ContainerHandle {
                id: spec.name.clone(),
                name: spec.name.clone(),
            })
        }

        async fn inspect(
            &self,
            container: &str,
            _log_tail: usize,
        ) -> Result<Option<ContainerState>, RuntimeError> {
            Ok(self.status_of(container).map(|status| ContainerState {
                status,
                exit_code: None,
                log_tail: None,
            }))
        }

        async fn logs(&self, _container: &str, _tail: usize) -> Result<String, RuntimeError> {
            Ok(String::new())
        }

        async fn stop(&self, container: &str) -> Result<(), RuntimeError> {
            self.calls.lock().push(format!("stop {}", container));
            match self.status.lock().get_mut(container) {
                Some(status) => {
                    *status = ContainerStatus::Exited;
                    Ok(())
                }
                None => Err(RuntimeError::not_found(container)),
            }
        }

        async fn remove(&self, container: &str) -> Result<(), RuntimeError> {
            match self.status.lock().remove(container) {
                Some(_) => Ok(()),
                None => Err(RuntimeError::not_found(container)),
            }
        }

        async fn exec_run(
            &self,
            _container: &str,
            _command: &str,
            _user: Option<&str>,
        ) -> Result<ExecOutput, RuntimeError> {
            Ok(ExecOutput {
                exit_code: 0,
                output: String::new(),
            })
        }

        async fn run_oneshot(&self, _spec: &ContainerSpec) -> Result<ExecOutput, RuntimeError> {
            Ok(ExecOutput {
                exit_code: 0,
                output: String::new(),
            })
        }

        async fn network_create_if_absent(&self, _name: &str) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn network_connect(
            &self,
            _container: &ContainerHandle,
            _network: &str,
            _aliases: &[String],
        ) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        runtime: Arc<Containers>,
        orchestrator: ProjectOrchestrator,
        project: Project,
        manager: DbEnvironmentManager,
        driver: Box<dyn DbDriver>,
    }

    impl Fixture {
        /// A project whose mysql service is running on the `default` environment.
        fn running() -> Self {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let mut db = Service::new("db", "mysql:8.0");
            db.roles.insert("db".to_string());
            let mut config = BTreeMap::new();
            config.insert("password".to_string(), "secret".to_string());
            config.insert("database".to_string(), "shop".to_string());
            db.driver = Some(DriverConfig {
                name: "mysql".to_string(),
                config,
            });
            let project = Project::new("shop", dir.path()).with_service(db);

            let manager = DbEnvironmentManager::new(&project);
            manager.currently_selected().unwrap();

            let runtime = Arc::new(Containers::default());
            runtime
                .status
                .lock()
                .insert(DB.to_string(), ContainerStatus::Running);
            let settings = EngineSettings {
                health_check_delay: "0s".to_string(),
                ..EngineSettings::default()
            };
            let orchestrator = ProjectOrchestrator::new(runtime.clone(), settings);
            let driver = orchestrator
                .drivers()
                .for_service(project.service("db").unwrap())
                .unwrap()
                .unwrap();
            Fixture {
                _dir: dir,
                runtime,
                orchestrator,
                project,
                manager,
                driver,
            }
        }

        fn context(&self) -> DbContext<'_> {
            DbContext {
                orchestrator: &self.orchestrator,
                project: &self.project,
                service: self.project.service("db").unwrap(),
                driver: self.driver.as_ref(),
                manager: &self.manager,
                verbose: false,
                out: &QuietOutput,
            }
        }
    }

    #[tokio::test]
    async fn test_existing_environment_leaves_db_running() {
        let fixture = Fixture::running();
        let ctx = fixture.context();

        let err = ctx.create("default", None, false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Environment(EnvironmentError::AlreadyExists(_)))
        ));
        let err = ctx.create("copy", Some("missing"), false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Environment(EnvironmentError::NotFound(_)))
        ));
        assert_eq!(fixture.runtime.calls_to("stop"), 0);
        assert_eq!(fixture.runtime.status_of(DB), Some(ContainerStatus::Running));
    }

    #[tokio::test]
    async fn test_switch_to_missing_environment_leaves_db_running() {
        let fixture = Fixture::running();
        let ctx = fixture.context();

        for name in ["staging", "../escape"] {
            assert!(ctx.switch(name).await.is_err());
        }
        assert_eq!(fixture.runtime.calls_to("stop"), 0);
        assert_eq!(fixture.manager.currently_selected().unwrap(), "default");
    }

    #[tokio::test]
    async fn test_failed_operation_restarts_db() {
        let fixture = Fixture::running();
        let ctx = fixture.context();

        let err = ctx
            .with_db_stopped(|| Err(anyhow::anyhow!("disk full")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(fixture.runtime.calls_to("stop"), 1);
        assert_eq!(fixture.runtime.calls_to("create"), 1);
        assert_eq!(fixture.runtime.status_of(DB), Some(ContainerStatus::Running));
    }

    #[tokio::test]
    async fn test_new_environment_switches_with_restart() {
        let fixture = Fixture::running();
        let ctx = fixture.context();

        ctx.create("staging", None, false).await.unwrap();
        assert_eq!(fixture.manager.currently_selected().unwrap(), "staging");
        assert_eq!(fixture.runtime.calls_to("stop"), 1);
        assert_eq!(fixture.runtime.status_of(DB), Some(ContainerStatus::Running));

        ctx.create("snapshot", Some("staging"), true).await.unwrap();
        assert_eq!(fixture.manager.currently_selected().unwrap(), "staging");
        assert_eq!(fixture.runtime.calls_to("stop"), 1);
    }
}
