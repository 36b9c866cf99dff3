//! Database environments and drivers.

pub mod driver;
mod environments;
mod error;

pub use driver::{DbDriver, DriverRegistry, MySqlDriver};
pub use environments::{
    is_valid_name, DbEnvironmentManager, DB_DATA_DIR, DEFAULT_ENVIRONMENT,
};
pub use error::{DriverError, EnvironmentError};

use crate::config::{Project, Service};

/// The `db` role service of `project`, if it has a driver configured.
pub fn db_service(project: &Project) -> Option<&Service> {
    project
        .services
        .values()
        .find(|s| s.is_db() && s.driver.is_some())
}

/// Whether `project` has a database whose environments can be managed.
pub fn has_db(project: &Project) -> bool {
    db_service(project).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;

    #[test]
    fn test_has_db_requires_role_and_driver() {
        let mut db = Service::new("db", "mysql:8");
        db.roles.insert("db".to_string());
        let project = Project::new("shop", "/w").with_service(db.clone());
        assert!(!has_db(&project));

        db.driver = Some(DriverConfig {
            name: "mysql".to_string(),
            ..Default::default()
        });
        let project = Project::new("shop", "/w").with_service(db);
        assert!(has_db(&project));

        let mut not_db = Service::new("cache", "redis");
        not_db.driver = Some(DriverConfig::default());
        assert!(!has_db(&Project::new("shop", "/w").with_service(not_db)));
    }
}
