/// Poisoning a batch through the orchestrator's cancellation token.
///
/// A stalled image pull keeps one worker busy while the test cancels the
/// batch, which must end that service's channel without a terminal event.
mod common;

use common::{
    collect, events_for, fast_settings, orchestrator, orchestrator_with, web_project, FakeRuntime,
};
use riptide::engine::{ServiceEvent, ServiceOutcome};
use riptide::runtime::ContainerStatus;
use riptide::EngineSettings;
use std::time::Duration;
use tokio::time::timeout;

const BATCH_TIMEOUT: Duration = Duration::from_secs(10);
const WEB: &str = "riptide__shop__web";

fn step_texts(events: &[ServiceEvent], service: &str) -> Vec<String> {
    events_for(events, service)
        .into_iter()
        .filter_map(|e| e.progress())
        .map(|p| p.text.clone())
        .collect()
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_service() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    runtime.stall_pull("nginx:1.25");
    let orchestrator = orchestrator(runtime.clone());
    let project = web_project(dir.path());

    let stream = orchestrator
        .start_project(&project, &["web".to_string()], false)
        .await
        .expect("batch should be accepted");

    let token = orchestrator.cancellation_token();
    let mut events = Vec::new();
    let report = timeout(
        BATCH_TIMEOUT,
        stream.fold_report(|event| {
            if event.progress().map(|p| p.text.as_str()) == Some("Pulling image...") {
                token.cancel();
            }
            events.push(event.clone());
        }),
    )
    .await
    .expect("cancelled batch must finish");

    assert!(orchestrator.is_cancelled());
    assert!(matches!(report.outcome("web"), Some(ServiceOutcome::Interrupted)));
    assert_eq!(report.interrupted().count(), 1);
    assert!(!report.has_errors());
    assert!(events.iter().all(|e| !e.finished));
    assert!(runtime.calls_to("create").is_empty());
}

#[tokio::test]
async fn test_cancel_leaves_other_services_unfailed() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    runtime.stall_pull("nginx:1.25");
    let orchestrator = orchestrator(runtime.clone());
    let project = web_project(dir.path());

    let stream = orchestrator
        .start_project(&project, &["web".to_string(), "mail".to_string()], true)
        .await
        .expect("batch should be accepted");

    let token = orchestrator.cancellation_token();
    let mut events = Vec::new();
    let report = timeout(
        BATCH_TIMEOUT,
        stream.fold_report(|event| {
            if event.service == "web" && event.progress().map(|p| p.current) == Some(2) {
                token.cancel();
            }
            events.push(event.clone());
        }),
    )
    .await
    .expect("cancelled batch must finish");

    assert!(matches!(report.outcome("web"), Some(ServiceOutcome::Interrupted)));
    // mail either finished before the cancel or was interrupted, never failed.
    assert!(matches!(
        report.outcome("mail"),
        Some(ServiceOutcome::Succeeded) | Some(ServiceOutcome::Interrupted)
    ));
    assert!(!report.has_errors());
    for service in ["web", "mail"] {
        let finished = events_for(&events, service)
            .iter()
            .filter(|e| e.finished)
            .count();
        assert!(finished <= 1);
    }
}

#[tokio::test]
async fn test_cancelled_orchestrator_stays_poisoned_until_reset() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    let mut orchestrator = orchestrator(runtime.clone());
    let project = web_project(dir.path());
    let services = vec!["mail".to_string()];

    orchestrator.cancel_operations();
    let stream = orchestrator
        .start_project(&project, &services, true)
        .await
        .expect("batch should be accepted");
    let (events, report) = timeout(BATCH_TIMEOUT, collect(stream))
        .await
        .expect("poisoned batch must finish");
    assert!(events.is_empty());
    assert!(matches!(report.outcome("mail"), Some(ServiceOutcome::Interrupted)));
    assert!(runtime.calls_to("create").is_empty());

    orchestrator.reset_cancellation();
    assert!(!orchestrator.is_cancelled());
    let stream = orchestrator
        .start_project(&project, &services, true)
        .await
        .expect("batch should be accepted");
    let (_, report) = timeout(BATCH_TIMEOUT, collect(stream))
        .await
        .expect("batch must finish");
    assert!(report.is_success());
    assert_eq!(runtime.calls_to("create"), vec!["create riptide__shop__mail"]);
}

#[tokio::test]
async fn test_cancel_during_stop_keeps_the_container() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    runtime.put_container(WEB, ContainerStatus::Running);
    let orchestrator = orchestrator(runtime.clone());
    runtime.cancel_on("inspect", orchestrator.cancellation_token());
    let project = web_project(dir.path());

    let stream = orchestrator
        .stop_project(&project, &["web".to_string()])
        .await
        .expect("batch should be accepted");
    let (events, report) = timeout(BATCH_TIMEOUT, collect(stream))
        .await
        .expect("cancelled batch must finish");

    assert!(matches!(report.outcome("web"), Some(ServiceOutcome::Interrupted)));
    assert!(!report.has_errors());
    assert!(events.iter().all(|e| !e.finished));
    assert_eq!(step_texts(&events, "web"), vec!["Checking..."]);
    assert!(runtime.calls_to("stop").is_empty());
    assert!(runtime.calls_to("remove").is_empty());
    assert_eq!(
        runtime.container(WEB).map(|c| c.status),
        Some(ContainerStatus::Running)
    );
}

#[tokio::test]
async fn test_cancel_between_pre_start_commands() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    let orchestrator = orchestrator(runtime.clone());
    runtime.cancel_on("oneshot", orchestrator.cancellation_token());
    let mut project = web_project(dir.path());
    if let Some(web) = project.services.get_mut("web") {
        web.pre_start = vec!["echo first".to_string(), "echo second".to_string()];
    }

    let stream = orchestrator
        .start_project(&project, &["web".to_string()], false)
        .await
        .expect("batch should be accepted");
    let (events, report) = timeout(BATCH_TIMEOUT, collect(stream))
        .await
        .expect("cancelled batch must finish");

    assert!(matches!(report.outcome("web"), Some(ServiceOutcome::Interrupted)));
    assert!(events.iter().all(|e| !e.finished));
    assert_eq!(runtime.calls_to("oneshot").len(), 1);
    assert!(runtime.calls_to("create").is_empty());
    assert_eq!(
        step_texts(&events, "web").last().map(String::as_str),
        Some("Running pre-start command 1/2...")
    );
}

#[tokio::test]
async fn test_cancel_before_container_is_started() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    let orchestrator = orchestrator(runtime.clone());
    runtime.cancel_on("oneshot", orchestrator.cancellation_token());
    let project = web_project(dir.path());

    let stream = orchestrator
        .start_project(&project, &["web".to_string()], false)
        .await
        .expect("batch should be accepted");
    let (events, report) = timeout(BATCH_TIMEOUT, collect(stream))
        .await
        .expect("cancelled batch must finish");

    assert!(matches!(report.outcome("web"), Some(ServiceOutcome::Interrupted)));
    assert!(events.iter().all(|e| !e.finished));
    let texts = step_texts(&events, "web");
    assert!(!texts.iter().any(|t| t == "Starting container..."), "{:?}", texts);
    assert!(runtime.calls_to("create").is_empty());
    assert!(runtime.calls_to("exec").is_empty());
}

#[tokio::test]
async fn test_cancel_during_health_delay() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let runtime = FakeRuntime::new();
    let settings = EngineSettings {
        health_check_delay: "30s".to_string(),
        ..fast_settings()
    };
    let orchestrator = orchestrator_with(runtime.clone(), settings);
    let project = web_project(dir.path());

    let stream = orchestrator
        .start_project(&project, &["web".to_string()], false)
        .await
        .expect("batch should be accepted");

    let token = orchestrator.cancellation_token();
    let mut events = Vec::new();
    let report = timeout(
        BATCH_TIMEOUT,
        stream.fold_report(|event| {
            if event.progress().map(|p| p.text.as_str()) == Some("Verifying health...") {
                token.cancel();
            }
            events.push(event.clone());
        }),
    )
    .await
    .expect("the health delay must observe cancellation");

    assert!(matches!(report.outcome("web"), Some(ServiceOutcome::Interrupted)));
    assert!(events.iter().all(|e| !e.finished));
    assert_eq!(
        step_texts(&events, "web").last().map(String::as_str),
        Some("Verifying health...")
    );
    assert_eq!(runtime.calls_to("create").len(), 1);
    assert!(runtime.calls_to("exec").is_empty());
}
