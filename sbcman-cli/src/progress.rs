//! Terminal progress rendering for download and update runs.

use std::sync::Mutex;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use sbcman::manager::DownloadObserver;

/// Resolution of the overall progress bar.
const BAR_LENGTH: u64 = 1000;

/// Renders observer events as a progress bar and records the final outcome.
pub struct TerminalObserver {
    bar: ProgressBar,
    outcome: Mutex<Option<(bool, String)>>,
}

impl TerminalObserver {
    /// Create a visible bar, or a hidden one when `quiet`.
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(BAR_LENGTH);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        };

        Self {
            bar,
            outcome: Mutex::new(None),
        }
    }

    /// `(success, message)` of the last completion or error.
    pub fn outcome(&self) -> Option<(bool, String)> {
        self.outcome.lock().ok().and_then(|slot| slot.clone())
    }
}

impl DownloadObserver for TerminalObserver {
    fn on_progress(&self, downloaded: u64, total: u64) {
        if total > 0 {
            self.bar.set_message(format!(
                "{} / {}",
                HumanBytes(downloaded),
                HumanBytes(total)
            ));
        } else {
            self.bar.set_message(format!("{}", HumanBytes(downloaded)));
        }
    }

    fn on_overall_progress(&self, fraction: f64) {
        let position = (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64;
        self.bar.set_position(position);
        if fraction >= sbcman::manager::DOWNLOAD_STAGE_SHARE && position < BAR_LENGTH {
            self.bar.set_message("installing");
        }
    }

    fn on_complete(&self, success: bool, message: &str) {
        if success {
            self.bar.finish_with_message("done");
        } else {
            self.bar.abandon();
        }
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = Some((success, message.to_string()));
        }
    }

    fn on_error(&self, message: &str) {
        tracing::debug!(message, "Run reported an error");
        // Refusals arrive without a completion; keep the reason.
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = Some((false, message.to_string()));
        }
    }
}
