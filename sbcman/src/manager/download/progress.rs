//! Staged progress shared by the download manager and the update service.
//!
//! Every operation runs two stages: download, then install. Each stage
//! reports a local fraction in `[0, 1]` which is rescaled into its slice of
//! the global bar:
//!
//! ```text
//! 0.0 ─── Download ─── 0.6 ─── Install ─── 1.0
//! ```

/// Share of the global progress bar owned by the download stage.
pub const DOWNLOAD_STAGE_SHARE: f64 = 0.6;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the artifact.
    Download,
    /// Installing the artifact.
    Install,
}

impl Stage {
    /// Map a stage-local fraction onto the global bar.
    pub fn rescale(&self, fraction: f64) -> f64 {
        let fraction = clamp_unit(fraction);
        match self {
            Self::Download => fraction * DOWNLOAD_STAGE_SHARE,
            Self::Install => DOWNLOAD_STAGE_SHARE + fraction * (1.0 - DOWNLOAD_STAGE_SHARE),
        }
    }
}

/// A stage-local progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Stage the fraction refers to.
    pub stage: Stage,
    /// Progress within the stage, `[0, 1]`.
    pub fraction: f64,
}

impl ProgressEvent {
    /// Download progress from byte counts. An unknown total yields 0.
    pub fn download(downloaded: u64, total: u64) -> Self {
        Self {
            stage: Stage::Download,
            fraction: ratio(downloaded, total),
        }
    }

    /// Install progress from member counts. An empty archive counts as done.
    pub fn install(done: usize, total: usize) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        Self {
            stage: Stage::Install,
            fraction,
        }
    }

    /// Global fraction for this event.
    pub fn global(&self) -> f64 {
        self.stage.rescale(self.fraction)
    }
}

/// Accumulates events into a non-decreasing global fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StagedProgress {
    current: f64,
}

impl StagedProgress {
    /// Start at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event, returning the new global value if it moved forward.
    pub fn advance(&mut self, event: ProgressEvent) -> Option<f64> {
        let next = event.global();
        if next > self.current {
            self.current = next;
            Some(next)
        } else {
            None
        }
    }

    /// Jump to 1.0.
    pub fn complete(&mut self) -> f64 {
        self.current = 1.0;
        self.current
    }

    /// Current global fraction.
    pub fn value(&self) -> f64 {
        self.current
    }
}

fn ratio(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        clamp_unit(done as f64 / total as f64)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
