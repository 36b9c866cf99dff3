use crate::cli::ServiceSelection;
use crate::output::{print_report, BatchProgress, UserOutput};
use riptide::engine::{BatchReport, MultiResultStream};
use riptide::{Project, ProjectOrchestrator};

/// Services named by a selection. Without any names or flags, `fallback` is used.
pub fn resolve_selection(
    project: &Project,
    selection: &ServiceSelection,
    fallback: fn(&Project) -> Vec<String>,
) -> Vec<String> {
    if selection.all {
        project.service_names()
    } else if selection.default {
        project.default_service_names()
    } else if !selection.services.is_empty() {
        selection.services.clone()
    } else {
        fallback(project)
    }
}

/// Drain a batch while rendering progress. Ctrl-C poisons the batch.
pub async fn drive_batch(
    orchestrator: &ProjectOrchestrator,
    stream: MultiResultStream,
    verbose: bool,
    out: &dyn UserOutput,
) -> BatchReport {
    let token = orchestrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received, cancelling batch");
            token.cancel();
        }
    });

    let progress = BatchProgress::new(stream.services(), out.show_progress());
    let report = stream.fold_report(|event| progress.handle(event)).await;
    progress.finish();
    interrupt.abort();

    print_report(&report, verbose, out);
    report
}

fn finish(report: &BatchReport, cancelled: bool, what: &str) -> anyhow::Result<()> {
    if cancelled {
        return Err(riptide::Error::Aborted.into());
    }
    if report.has_errors() {
        let failed: Vec<&str> = report.errors().map(|(name, _)| name.as_str()).collect();
        anyhow::bail!("Failed to {} {}", what, failed.join(", "));
    }
    Ok(())
}

pub async fn run_start(
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    selection: &ServiceSelection,
    quick: bool,
    verbose: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let services = resolve_selection(project, selection, Project::default_service_names);
    if services.is_empty() {
        out.warning("No services to start");
        return Ok(());
    }

    out.status(&format!("Starting services of '{}'...", project.name));
    let stream = orchestrator.start_project(project, &services, quick).await?;
    let report = drive_batch(orchestrator, stream, verbose, out).await;
    finish(&report, orchestrator.is_cancelled(), "start")?;
    out.success("Services started");
    Ok(())
}

pub async fn run_stop(
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    selection: &ServiceSelection,
    verbose: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let services = resolve_selection(project, selection, Project::service_names);
    if services.is_empty() {
        out.warning("No services to stop");
        return Ok(());
    }

    out.status(&format!("Stopping services of '{}'...", project.name));
    let stream = orchestrator.stop_project(project, &services).await?;
    let report = drive_batch(orchestrator, stream, verbose, out).await;
    finish(&report, orchestrator.is_cancelled(), "stop")?;
    out.success("Services stopped");
    Ok(())
}

pub async fn run_restart(
    orchestrator: &ProjectOrchestrator,
    project: &Project,
    selection: &ServiceSelection,
    quick: bool,
    verbose: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let services = resolve_selection(project, selection, Project::service_names);
    let explicit = ServiceSelection {
        services,
        ..Default::default()
    };
    run_stop(orchestrator, project, &explicit, verbose, out).await?;
    run_start(orchestrator, project, &explicit, quick, verbose, out).await
}
