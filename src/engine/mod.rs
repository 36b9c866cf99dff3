//! Service lifecycle orchestration.
//!
//! - `results` - per-service progress channels, merging and batch reports
//! - `service` - start/stop state machine of one service
//! - `project` - concurrent fan-out over the services of a project
//! - `status` - point-in-time container status
//! - `exec` - one-off commands in service and command containers

mod exec;
mod project;
pub mod results;
mod service;
mod status;

pub use project::ProjectOrchestrator;
pub use results::{
    BatchReport, MultiResultStream, ProgressStep, ResultError, ResultMessage, ResultReceiver,
    ResultSender, ServiceEvent, ServiceOutcome,
};
pub use service::{ServiceLifecycleController, ServiceOverlay};
pub use status::{service_status, ServiceState, ServiceStatus};
