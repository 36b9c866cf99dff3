//! Per-service progress channels and the merged batch stream.
//!
//! Every service worker owns a [`ResultSender`]. Progress steps may be sent
//! any number of times; a terminal message is sent by consuming the sender
//! with [`ResultSender::end`] or [`ResultSender::end_with_error`], so nothing
//! can follow it. A sender dropped without a terminal message marks a worker
//! that stopped because the batch was cancelled.

use futures::stream::{self, BoxStream, SelectAll};
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One state-machine transition of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStep {
    pub current: usize,
    /// `None` while the number of steps is not yet known.
    pub total: Option<usize>,
    pub text: String,
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "[{}/{}] {}", self.current, total, self.text),
            None => write!(f, "[{}/?] {}", self.current, self.text),
        }
    }
}

/// A failure contained to one service.
#[derive(Debug, Clone)]
pub struct ResultError {
    pub message: String,
    pub cause: Option<Arc<dyn StdError + Send + Sync>>,
    /// Extra output such as the log tail of a crashed container.
    pub details: Option<String>,
}

impl ResultError {
    pub fn new(message: impl Into<String>) -> Self {
        ResultError {
            message: message.into(),
            cause: None,
            details: None,
        }
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Messages of the cause and all of its sources, outermost first.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut next = self.source();
        while let Some(err) = next {
            chain.push(err.to_string());
            next = err.source();
        }
        chain
    }
}

impl fmt::Display for ResultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for ResultError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

#[derive(Debug, Clone)]
pub enum ResultMessage {
    Progress(ProgressStep),
    Error(ResultError),
}

/// An item of the merged stream.
///
/// `message == None && finished` is a clean success.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub service: String,
    pub message: Option<ResultMessage>,
    pub finished: bool,
}

impl ServiceEvent {
    pub fn progress(&self) -> Option<&ProgressStep> {
        match &self.message {
            Some(ResultMessage::Progress(step)) => Some(step),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ResultError> {
        match &self.message {
            Some(ResultMessage::Error(err)) => Some(err),
            _ => None,
        }
    }
}

/// Create the channel for one service.
pub fn channel(service: impl Into<String>) -> (ResultSender, ResultReceiver) {
    let service = service.into();
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ResultSender {
            service: service.clone(),
            tx,
            last_step: 0,
        },
        ResultReceiver { service, rx },
    )
}

/// Producer half of a service's channel.
#[derive(Debug)]
pub struct ResultSender {
    service: String,
    tx: mpsc::UnboundedSender<ServiceEvent>,
    last_step: usize,
}

impl ResultSender {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Report progress. Step indices never go backwards within a channel.
    pub fn step(&mut self, current: usize, total: Option<usize>, text: impl Into<String>) {
        debug_assert!(
            current >= self.last_step,
            "step {} after step {} for '{}'",
            current,
            self.last_step,
            self.service
        );
        self.last_step = current;
        let step = ProgressStep {
            current,
            total,
            text: text.into(),
        };
        tracing::debug!(service = %self.service, "{}", step);
        self.send(Some(ResultMessage::Progress(step)), false);
    }

    /// Terminate the channel with success.
    pub fn end(self) {
        self.send(None, true);
    }

    /// Terminate the channel with an error.
    pub fn end_with_error(self, error: ResultError) {
        tracing::debug!(service = %self.service, "failed: {}", error);
        self.send(Some(ResultMessage::Error(error)), true);
    }

    fn send(&self, message: Option<ResultMessage>, finished: bool) {
        // The receiver may already be gone if the caller stopped listening.
        let _ = self.tx.send(ServiceEvent {
            service: self.service.clone(),
            message,
            finished,
        });
    }
}

/// Consumer half of a service's channel.
#[derive(Debug)]
pub struct ResultReceiver {
    service: String,
    rx: mpsc::UnboundedReceiver<ServiceEvent>,
}

impl ResultReceiver {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn into_stream(self) -> BoxStream<'static, ServiceEvent> {
        stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }
}

/// Merge per-service channels into one stream.
///
/// Each channel's order is preserved; across channels whichever event is
/// ready first is yielded first.
pub fn merge(receivers: Vec<ResultReceiver>) -> MultiResultStream {
    let services = receivers.iter().map(|r| r.service.clone()).collect();
    let inner = futures::stream::select_all(receivers.into_iter().map(ResultReceiver::into_stream));
    MultiResultStream { services, inner }
}

/// The merged stream returned to callers of a start/stop batch.
pub struct MultiResultStream {
    services: Vec<String>,
    inner: SelectAll<BoxStream<'static, ServiceEvent>>,
}

impl MultiResultStream {
    /// Services this batch was started for.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Drain the stream into a per-service report.
    pub async fn into_report(self) -> BatchReport {
        self.fold_report(|_| {}).await
    }

    /// Drain the stream, handing every event to `on_event` before folding it
    /// into the report.
    pub async fn fold_report<F>(mut self, mut on_event: F) -> BatchReport
    where
        F: FnMut(&ServiceEvent),
    {
        let mut outcomes: BTreeMap<String, ServiceOutcome> = BTreeMap::new();
        while let Some(event) = self.inner.next().await {
            on_event(&event);
            if event.finished {
                let outcome = match event.message {
                    Some(ResultMessage::Error(err)) => ServiceOutcome::Failed(err),
                    _ => ServiceOutcome::Succeeded,
                };
                outcomes.insert(event.service, outcome);
            }
        }
        for service in self.services {
            outcomes
                .entry(service)
                .or_insert(ServiceOutcome::Interrupted);
        }
        BatchReport { outcomes }
    }
}

impl Stream for MultiResultStream {
    type Item = ServiceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Final state of one service of a batch.
#[derive(Debug, Clone)]
pub enum ServiceOutcome {
    Succeeded,
    Failed(ResultError),
    /// The worker stopped without a terminal message after cancellation.
    Interrupted,
}

/// Aggregated result of a start/stop batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    outcomes: BTreeMap<String, ServiceOutcome>,
}

impl BatchReport {
    pub fn outcome(&self, service: &str) -> Option<&ServiceOutcome> {
        self.outcomes.get(service)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&String, &ServiceOutcome)> {
        self.outcomes.iter()
    }

    /// A batch is successful only if no service failed.
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&String, &ResultError)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            ServiceOutcome::Failed(err) => Some((name, err)),
            _ => None,
        })
    }

    pub fn interrupted(&self) -> impl Iterator<Item = &String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ServiceOutcome::Interrupted))
            .map(|(name, _)| name)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .values()
            .all(|o| matches!(o, ServiceOutcome::Succeeded))
    }
}
