use riptide::config::shell_quote;
use riptide::runtime::ExecOutput;
use riptide::{Error, Project, ProjectOrchestrator};
use std::io::Write;

pub async fn run_exec(
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    service: Option<&str>,
    command: &[String],
) -> anyhow::Result<()> {
    let service = match service {
        Some(name) => name.to_string(),
        None => project
            .main_service()
            .map(|s| s.name.clone())
            .ok_or_else(|| {
                Error::Config("No service has the 'main' role; pass --service".to_string())
            })?,
    };
    let line = command
        .iter()
        .map(String::as_str)
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ");

    let output = orchestrator.exec(project, &service, &line).await?;
    pass_through(&line, output)
}

pub async fn run_cmd(
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    name: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let output = orchestrator.run_command(project, name, args).await?;
    pass_through(name, output)
}

/// Print the captured output; a non-zero exit becomes riptide's exit code.
fn pass_through(name: &str, output: ExecOutput) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.output.as_bytes())?;
    stdout.flush()?;
    if !output.success() {
        return Err(Error::CommandFailed {
            name: name.to_string(),
            exit_code: output.exit_code,
        }
        .into());
    }
    Ok(())
}
