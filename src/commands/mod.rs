mod db;
mod exec;
mod files;
mod lifecycle;
mod status;

pub use db::run_db;
pub use exec::{run_cmd, run_exec};
pub use files::run_import_files;
pub use lifecycle::{run_restart, run_start, run_stop};
pub use status::run_status;
