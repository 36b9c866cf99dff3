use super::DbDriver;
use crate::config::{Project, Service};
use crate::db::DriverError;
use crate::docker::{self, LABEL_MAIN, LABEL_PROJECT, LABEL_SERVICE};
use crate::runtime::{ContainerRuntime, ContainerSpec, Mount, PortBinding};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

pub(super) const DRIVER_NAME: &str = "mysql";

const IMAGE_NAME: &str = "mysql";
const DATA_PATH: &str = "/var/lib/mysql";
const ENV_PASSWORD: &str = "MYSQL_ROOT_PASSWORD";
const ENV_DATABASE: &str = "MYSQL_DATABASE";
const PORT: u16 = 3306;

const CONFIG_PASSWORD: &str = "password";
const CONFIG_DATABASE: &str = "database";

/// Driver for services running an official `mysql` image.
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    service: Service,
}

impl MySqlDriver {
    pub fn new(service: Service) -> Self {
        MySqlDriver { service }
    }

    fn config_value(&self, key: &str) -> &str {
        self.service
            .driver
            .as_ref()
            .and_then(|d| d.config.get(key))
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn password(&self) -> &str {
        self.config_value(CONFIG_PASSWORD)
    }

    fn database(&self) -> &str {
        self.config_value(CONFIG_DATABASE)
    }

    /// One-off container from the service image, on the project network so
    /// the running database is reachable by its service name.
    fn command_spec(&self, project: &Project, purpose: &str, command: String, mount: Mount) -> ContainerSpec {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_PROJECT.to_string(), project.name.clone());
        labels.insert(LABEL_SERVICE.to_string(), self.service.name.clone());
        labels.insert(LABEL_MAIN.to_string(), "0".to_string());

        ContainerSpec {
            name: docker::oneshot_container_name(&project.name, &self.service.name, purpose),
            image: self.service.image.clone(),
            entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            command: Some(vec![command]),
            mounts: vec![mount],
            labels,
            network: Some(docker::network_name(&project.name)),
            ..Default::default()
        }
    }

    async fn run(
        &self,
        runtime: &dyn ContainerRuntime,
        operation: &str,
        spec: &ContainerSpec,
    ) -> Result<(), DriverError> {
        let output = runtime.run_oneshot(spec).await?;
        if !output.success() {
            return Err(DriverError::ImportExport {
                operation: operation.to_string(),
                output: format!("MySQL command failed: {}", output.output.trim()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DbDriver for MySqlDriver {
    /// Only `mysql` images are supported, and the driver config must name the
    /// root password and the database.
    fn validate_service(&self) -> Result<(), DriverError> {
        let repository = self
            .service
            .image
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .split(':')
            .next()
            .unwrap_or_default();
        if repository != IMAGE_NAME {
            return Err(DriverError::validation(
                &self.service.name,
                "A mysql database driver may only be used with 'mysql' images",
            ));
        }

        let config = self
            .service
            .driver
            .as_ref()
            .map(|d| &d.config)
            .ok_or_else(|| DriverError::validation(&self.service.name, "No driver configured"))?;
        for key in [CONFIG_PASSWORD, CONFIG_DATABASE] {
            if !config.contains_key(key) {
                return Err(DriverError::validation(
                    &self.service.name,
                    format!("The mysql driver config requires '{}'", key),
                ));
            }
        }
        if let Some(extra) = config
            .keys()
            .find(|k| *k != CONFIG_PASSWORD && *k != CONFIG_DATABASE)
        {
            return Err(DriverError::validation(
                &self.service.name,
                format!("Unknown mysql driver config key '{}'", extra),
            ));
        }
        Ok(())
    }

    async fn import_from(
        &self,
        runtime: &dyn ContainerRuntime,
        project: &Project,
        path: &Path,
    ) -> Result<(), DriverError> {
        let command = format!(
            "mysql -h{} -uroot -p{} {} < /db_file",
            self.service.name,
            self.password(),
            self.database()
        );
        let mount = Mount {
            host: path.to_path_buf(),
            container: "/db_file".to_string(),
            read_only: true,
        };
        let spec = self.command_spec(project, "import", command, mount);
        self.run(runtime, "import", &spec).await
    }

    async fn export_to(
        &self,
        runtime: &dyn ContainerRuntime,
        project: &Project,
        path: &Path,
    ) -> Result<(), DriverError> {
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Err(DriverError::ImportExport {
                operation: "export".to_string(),
                output: format!("'{}' is not a file path", path.display()),
            });
        };
        let command = format!(
            "mysqldump -h{} -uroot -p{} {} > /db_folder/{}",
            self.service.name,
            self.password(),
            self.database(),
            file_name.to_string_lossy()
        );
        let mount = Mount {
            host: dir.to_path_buf(),
            container: "/db_folder".to_string(),
            read_only: false,
        };
        let spec = self.command_spec(project, "export", command, mount);
        self.run(runtime, "export", &spec).await
    }

    fn collect_volumes(&self, data_dir: &Path) -> Vec<Mount> {
        vec![Mount {
            host: data_dir.to_path_buf(),
            container: DATA_PATH.to_string(),
            read_only: false,
        }]
    }

    fn collect_environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(ENV_PASSWORD.to_string(), self.password().to_string());
        env.insert(ENV_DATABASE.to_string(), self.database().to_string());
        env
    }

    fn collect_ports(&self) -> Vec<PortBinding> {
        vec![PortBinding {
            host: PORT,
            container: PORT,
        }]
    }

    fn collect_info(&self) -> Vec<(String, String)> {
        vec![
            ("Database".to_string(), self.database().to_string()),
            ("Password".to_string(), self.password().to_string()),
            ("Port".to_string(), PORT.to_string()),
            ("Data directory".to_string(), DATA_PATH.to_string()),
        ]
    }

    fn prompt_for_import_path(&self) -> String {
        "Enter the path to the SQL file.".to_string()
    }
}
