use super::results::{self, MultiResultStream, ResultReceiver};
use super::service::{ServiceLifecycleController, ServiceOverlay};
use super::status::{self, ServiceStatus};
use crate::config::{EngineSettings, Project};
use crate::db::{DbEnvironmentManager, DriverRegistry};
use crate::docker;
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Start { quick: bool },
    Stop,
}

/// Starts and stops sets of services of a project concurrently.
///
/// Each requested service gets its own worker task and result channel; the
/// caller receives the merged stream immediately and drives it to completion.
/// Failures of one service never affect the others, and a failed batch is
/// not rolled back.
///
/// # Cancellation
///
/// [`cancel_operations`](Self::cancel_operations) poisons every running and
/// future batch. Workers check the token between steps, stop advancing and
/// close their channel without a terminal message. The token stays cancelled
/// until [`reset_cancellation`](Self::reset_cancellation) is called.
pub struct ProjectOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    settings: Arc<EngineSettings>,
    drivers: Arc<DriverRegistry>,
    cancellation_token: CancellationToken,
    pool: Arc<Semaphore>,
}

impl ProjectOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: EngineSettings) -> Self {
        let pool = Arc::new(Semaphore::new(settings.max_parallel.max(1)));
        ProjectOrchestrator {
            runtime,
            settings: Arc::new(settings),
            drivers: Arc::new(DriverRegistry::with_builtin()),
            cancellation_token: CancellationToken::new(),
            pool,
        }
    }

    pub fn with_drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = Arc::new(drivers);
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Poison all in-flight and future batches.
    pub fn cancel_operations(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Re-arm the orchestrator after a cancellation.
    pub fn reset_cancellation(&mut self) {
        self.cancellation_token = CancellationToken::new();
    }

    /// Token that cancels this orchestrator when cancelled, e.g. from a
    /// signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Start `services` of `project`.
    ///
    /// Unknown services, an unreachable runtime and an invalid database
    /// driver are reported here, before any worker runs. Everything else is
    /// reported per service through the returned stream.
    pub async fn start_project(
        &self,
        project: &Project,
        services: &[String],
        quick: bool,
    ) -> Result<MultiResultStream> {
        let names = resolve_services(project, services)?;
        self.runtime.ping().await?;

        let mut overlays = BTreeMap::new();
        for name in &names {
            if let Some(overlay) = self.db_overlay(project, name)? {
                overlays.insert(name.clone(), overlay);
            }
        }

        self.runtime
            .network_create_if_absent(&docker::network_name(&project.name))
            .await?;

        Ok(self.spawn_batch(project, names, overlays, Operation::Start { quick }))
    }

    /// Stop `services` of `project`. Services without a container succeed.
    pub async fn stop_project(
        &self,
        project: &Project,
        services: &[String],
    ) -> Result<MultiResultStream> {
        let names = resolve_services(project, services)?;
        self.runtime.ping().await?;
        Ok(self.spawn_batch(project, names, BTreeMap::new(), Operation::Stop))
    }

    /// Status of every service of `project`, by service name.
    pub async fn status(&self, project: &Project) -> Result<BTreeMap<String, ServiceStatus>> {
        self.runtime.ping().await?;
        let mut statuses = BTreeMap::new();
        for (name, service) in &project.services {
            let status = status::service_status(self.runtime.as_ref(), project, service).await?;
            statuses.insert(name.clone(), status);
        }
        Ok(statuses)
    }

    /// Driver volumes and environment for the db service, bound to the active
    /// environment's data directory.
    fn db_overlay(&self, project: &Project, name: &str) -> Result<Option<ServiceOverlay>> {
        let service = project.service(name)?;
        if !service.is_db() {
            return Ok(None);
        }
        let Some(driver) = self.drivers.for_service(service)? else {
            return Ok(None);
        };
        driver
            .validate_service()
            .map_err(|e| Error::Config(e.to_string()))?;

        let data_dir = DbEnvironmentManager::new(project).current_data_dir()?;
        tracing::debug!("Using {} as data directory for '{}'", data_dir.display(), name);
        Ok(Some(ServiceOverlay {
            mounts: driver.collect_volumes(&data_dir),
            environment: driver.collect_environment(),
            ports: driver.collect_ports(),
        }))
    }

    fn spawn_batch(
        &self,
        project: &Project,
        names: Vec<String>,
        mut overlays: BTreeMap<String, ServiceOverlay>,
        operation: Operation,
    ) -> MultiResultStream {
        let project = Arc::new(project.clone());
        let mut receivers: Vec<ResultReceiver> = Vec::with_capacity(names.len());

        for name in names {
            let Some(service) = project.services.get(&name).cloned() else {
                continue;
            };
            let (tx, rx) = results::channel(name.clone());
            receivers.push(rx);

            let token = self.cancellation_token.child_token();
            let controller = ServiceLifecycleController::new(
                self.runtime.clone(),
                project.clone(),
                service,
                self.settings.clone(),
                token.clone(),
            )
            .with_overlay(overlays.remove(&name).unwrap_or_default());
            let pool = self.pool.clone();

            let span = match operation {
                Operation::Start { .. } => tracing::info_span!("start_service", service.name = %name),
                Operation::Stop => tracing::info_span!("stop_service", service.name = %name),
            };

            tokio::spawn(
                async move {
                    let _permit = tokio::select! {
                        permit = pool.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return,
                        },
                        _ = token.cancelled() => return,
                    };
                    if token.is_cancelled() {
                        return;
                    }
                    match operation {
                        Operation::Start { quick } => controller.start(quick, tx).await,
                        Operation::Stop => controller.stop(tx).await,
                    }
                }
                .instrument(span),
            );
        }

        results::merge(receivers)
    }
}

/// Check every name exists and drop duplicates, keeping the first occurrence.
fn resolve_services(project: &Project, services: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(services.len());
    for name in services {
        project.service(name)?;
        if seen.insert(name.as_str()) {
            names.push(name.clone());
        }
    }
    Ok(names)
}
