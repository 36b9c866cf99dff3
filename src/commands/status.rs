use crate::output::UserOutput;
use riptide::engine::ServiceState;
use riptide::{Project, ProjectOrchestrator};
use serde::Serialize;

#[derive(Serialize)]
struct StatusRow<'a> {
    service: &'a str,
    container: &'a str,
    status: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
}

pub async fn run_status(
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let statuses = orchestrator.status(project).await?;

    if json {
        let rows: Vec<StatusRow<'_>> = statuses
            .values()
            .map(|s| StatusRow {
                service: &s.service,
                container: &s.container,
                status: s.state,
                exit_code: s.details.as_ref().and_then(|d| d.exit_code),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    out.status(&format!("Project: {}", project.name));
    out.blank();
    if statuses.is_empty() {
        out.status("No services defined");
        return Ok(());
    }

    let width = statuses.keys().map(String::len).max().unwrap_or(0);
    for (name, status) in &statuses {
        let main = if project.service(name).map(|s| s.is_main()).unwrap_or(false) {
            " (main)"
        } else {
            ""
        };
        let line = format!("  {:<width$}  {}{}", name, status.state, main, width = width);
        match status.state {
            ServiceState::Running => out.success(&line),
            ServiceState::Starting => out.warning(&line),
            ServiceState::Stopped => out.status(&line),
        }
    }
    Ok(())
}
