//! # Riptide
//!
//! A per-project development environment orchestrator: brings the
//! containerized services of a project up and down with live per-service
//! progress, and manages swappable database data directories.
//!
//! ## Quick Start
//!
//! ```no_run
//! use riptide::{DockerClient, DriverRegistry, EngineSettings, Parser, ProjectOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), riptide::Error> {
//! let drivers = DriverRegistry::with_builtin();
//! let project = Parser::new(&drivers).load_project("riptide.yml")?;
//!
//! let orchestrator = ProjectOrchestrator::new(Arc::new(DockerClient::new()), EngineSettings::default());
//! let stream = orchestrator
//!     .start_project(&project, &project.service_names(), false)
//!     .await?;
//!
//! let report = stream.into_report().await;
//! for (service, error) in report.errors() {
//!     eprintln!("{}: {}", service, error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - One tokio task per requested service, bounded by `max_parallel`
//! - Progress flows through one channel per service, merged first-ready-wins
//! - Cancellation is cooperative via a `CancellationToken` checked between steps

pub mod config;
pub mod db;
pub mod docker;
pub mod engine;
pub mod error;
pub mod files;
pub mod runtime;

pub use config::{EngineSettings, Parser, Project, Service};
pub use db::{DbDriver, DbEnvironmentManager, DriverRegistry};
pub use docker::DockerClient;
pub use engine::{BatchReport, ProjectOrchestrator, ServiceLifecycleController};
pub use error::{Error, Result};
pub use runtime::{ContainerRuntime, RuntimeError};
