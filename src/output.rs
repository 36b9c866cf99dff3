use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use riptide::engine::{BatchReport, ServiceEvent, ServiceOutcome};
use std::collections::HashMap;

/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// `--json` output is not interleaved with status lines.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Stopping db...")
    fn status(&self, message: &str);

    /// Success message (e.g., "Switched to environment 'staging'")
    fn success(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    /// A blank line separator.
    fn blank(&self);

    /// Whether per-service progress bars should be drawn.
    fn show_progress(&self) -> bool;
}

/// Standard CLI output: writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn blank(&self) {
        println!();
    }

    fn show_progress(&self) -> bool {
        true
    }
}

/// Suppresses everything but errors. Used for machine-readable output.
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }
    fn blank(&self) {}
    fn show_progress(&self) -> bool {
        false
    }
}

const BAR_TEMPLATE: &str = "{prefix:>12.bold} [{bar:20.cyan/dim}] {msg}";
const DONE_TEMPLATE: &str = "{prefix:>12.bold} {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━─")
}

/// One progress bar per service of a start/stop batch.
pub struct BatchProgress {
    bars: HashMap<String, ProgressBar>,
}

impl BatchProgress {
    pub fn new(services: &[String], visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let bars = services
            .iter()
            .map(|service| {
                let bar = multi.add(ProgressBar::new(1));
                bar.set_style(style(BAR_TEMPLATE));
                bar.set_prefix(service.clone());
                bar.set_message("Waiting...");
                (service.clone(), bar)
            })
            .collect();
        BatchProgress { bars }
    }

    pub fn handle(&self, event: &ServiceEvent) {
        let Some(bar) = self.bars.get(&event.service) else {
            return;
        };
        if let Some(step) = event.progress() {
            // Unknown totals render as an empty bar until the total is known.
            bar.set_length(step.total.unwrap_or(step.current + 1) as u64);
            bar.set_position(step.current as u64);
            bar.set_message(step.text.clone());
        }
        if event.finished {
            bar.set_style(style(DONE_TEMPLATE));
            match event.error() {
                Some(err) => bar.finish_with_message(format!("✗ {}", err.message)),
                None => bar.finish_with_message(format!("✓ {}", bar.message())),
            }
        }
    }

    /// Mark bars that never received a terminal message.
    pub fn finish(self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.set_style(style(DONE_TEMPLATE));
                bar.abandon_with_message("Interrupted");
            }
        }
    }
}

/// Print the errors of a batch, with the cause chain when `verbose`.
pub fn print_report(report: &BatchReport, verbose: bool, out: &dyn UserOutput) {
    if !report.has_errors() && report.interrupted().next().is_none() {
        return;
    }
    out.blank();
    for (service, outcome) in report.outcomes() {
        match outcome {
            ServiceOutcome::Failed(err) => {
                out.error(&format!("{}: {}", service, err.message));
                if verbose {
                    for cause in err.cause_chain() {
                        out.error(&format!("    caused by: {}", cause));
                    }
                } else if let Some(cause) = err.cause_chain().first() {
                    out.error(&format!("    {}", cause));
                }
                if let Some(details) = &err.details {
                    for line in details.lines() {
                        out.status(&format!("    | {}", line));
                    }
                }
            }
            ServiceOutcome::Interrupted => {
                out.warning(&format!("{}: interrupted", service));
            }
            ServiceOutcome::Succeeded => {}
        }
    }
}
