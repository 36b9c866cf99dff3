//! Configuration parsing and types.
//!
//! - `project` - Resolved project document (`Project`)
//! - `service` - Service configuration (`Service`, `DriverConfig`)
//! - `command` - Project commands run in throwaway containers (`ProjectCommand`)
//! - `settings` - Engine settings shared by all projects (`EngineSettings`)
//! - `duration` - Duration string parsing
//! - `parser` - YAML loading and structural validation

mod command;
mod duration;
mod parser;
mod project;
mod service;
mod settings;

pub use command::*;
pub use duration::*;
pub use parser::*;
pub use project::*;
pub use service::*;
pub use settings::*;
