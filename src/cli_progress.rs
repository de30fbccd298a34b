/*!
 * CLI progress renderer for interactive terminal display
 *
 * Draws one indicatif bar per batch from polled `BatchProgress` snapshots and
 * prints unit events (retries, failures) above it as they arrive.
 */

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::batch::BatchProgress;
use crate::core::progress::{BatchKind, BatchOutcome, PatchEvent, ProgressSubscriber};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";

/// CLI progress renderer
pub struct CliProgressRenderer {
    subscriber: ProgressSubscriber,
    bar: ProgressBar,
    verbose: bool,
}

impl CliProgressRenderer {
    /// Create a renderer for one batch of `total_bytes`
    pub fn new(
        subscriber: ProgressSubscriber,
        kind: BatchKind,
        total_bytes: u64,
        verbose: bool,
    ) -> Self {
        let bar = ProgressBar::new(total_bytes);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_prefix(kind.to_string());
        Self {
            subscriber,
            bar,
            verbose,
        }
    }

    /// A renderer that draws nothing (non-interactive output)
    pub fn hidden(subscriber: ProgressSubscriber, verbose: bool) -> Self {
        Self {
            subscriber,
            bar: ProgressBar::hidden(),
            verbose,
        }
    }

    /// Render pending events and the latest snapshot
    pub fn update(&self, progress: &BatchProgress) {
        while let Some(event) = self.subscriber.try_recv() {
            if let Some(line) = self.describe(&event) {
                self.bar.println(line);
            }
        }
        self.bar.set_length(progress.total_bytes);
        self.bar.set_position(progress.downloaded_bytes);
        self.bar.set_message(format!(
            "{} done, {} active, {} queued",
            progress.succeeded, progress.in_flight, progress.pending
        ));
    }

    /// Render the final snapshot and close the bar
    pub fn finish(&self, progress: &BatchProgress) {
        self.update(progress);
        if progress.is_succeeded {
            self.bar.finish_with_message(format!(
                "{} bundles, {}",
                progress.succeeded,
                format_bytes(progress.downloaded_bytes)
            ));
        } else {
            self.bar.abandon_with_message(format!(
                "{} succeeded, {} failed",
                progress.succeeded, progress.failed
            ));
        }
    }

    /// One console line for an event, or None if it is not shown
    fn describe(&self, event: &PatchEvent) -> Option<String> {
        match event {
            PatchEvent::UnitStarted {
                bundle,
                url,
                attempt,
                ..
            } if self.verbose => Some(format!("  -> {} (attempt {}) {}", bundle, attempt, url)),
            PatchEvent::UnitStarted { .. } => None,
            PatchEvent::UnitRetrying {
                bundle,
                url,
                code,
                message,
                retries_left,
                ..
            } => Some(format!(
                "  ! retrying {} from {} (code {}, {} left): {}",
                bundle, url, code, retries_left, message
            )),
            PatchEvent::UnitSucceeded { bundle, bytes, .. } if self.verbose => {
                Some(format!("  ok {} ({})", bundle, format_bytes(*bytes)))
            }
            PatchEvent::UnitSucceeded { .. } => None,
            PatchEvent::UnitFailed {
                bundle,
                code,
                message,
                ..
            } => Some(format!("  x {} failed (code {}): {}", bundle, code, message)),
            PatchEvent::BatchFinished { kind, outcome, .. } => match outcome {
                BatchOutcome::Succeeded => None,
                BatchOutcome::Failed => Some(format!("{} failed", kind)),
                BatchOutcome::Aborted => Some(format!("{} aborted", kind)),
            },
        }
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
