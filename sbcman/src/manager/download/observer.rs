//! Observer interface between the background workers and the UI.
//!
//! Callbacks arrive on the worker thread. Within one operation progress is
//! non-decreasing, an error always precedes a failed completion, and the
//! completion is always the last notification.

use std::sync::mpsc::{self, Receiver, Sender};

/// Receives notifications from a download or update run.
pub trait DownloadObserver: Send + Sync {
    /// Raw byte progress of the download stage. `total` is 0 when unknown.
    fn on_progress(&self, downloaded: u64, total: u64);

    /// Global staged progress in `[0, 1]`.
    fn on_overall_progress(&self, _fraction: f64) {}

    /// The run finished. Always the last notification.
    fn on_complete(&self, success: bool, message: &str);

    /// The run hit an error. Followed by `on_complete(false, ..)` unless the
    /// run was refused before starting.
    fn on_error(&self, message: &str);
}

/// Notification as a value, for consumers that prefer polling a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// See [`DownloadObserver::on_progress`].
    Progress { downloaded: u64, total: u64 },
    /// See [`DownloadObserver::on_overall_progress`].
    Overall(f64),
    /// See [`DownloadObserver::on_complete`].
    Complete { success: bool, message: String },
    /// See [`DownloadObserver::on_error`].
    Error(String),
}

impl DownloadEvent {
    /// Whether this is the final event of a run.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Observer that forwards every notification into an mpsc channel.
///
/// Send failures (receiver dropped) are ignored.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: parking_lot::Mutex<Sender<DownloadEvent>>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    pub fn new() -> (Self, Receiver<DownloadEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: parking_lot::Mutex::new(sender),
            },
            receiver,
        )
    }

    fn send(&self, event: DownloadEvent) {
        let _ = self.sender.lock().send(event);
    }
}

impl DownloadObserver for ChannelObserver {
    fn on_progress(&self, downloaded: u64, total: u64) {
        self.send(DownloadEvent::Progress { downloaded, total });
    }

    fn on_overall_progress(&self, fraction: f64) {
        self.send(DownloadEvent::Overall(fraction));
    }

    fn on_complete(&self, success: bool, message: &str) {
        self.send(DownloadEvent::Complete {
            success,
            message: message.to_string(),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(DownloadEvent::Error(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (observer, events) = ChannelObserver::new();

        observer.on_progress(10, 100);
        observer.on_overall_progress(0.06);
        observer.on_error("boom");
        observer.on_complete(false, "boom");

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                DownloadEvent::Progress {
                    downloaded: 10,
                    total: 100
                },
                DownloadEvent::Overall(0.06),
                DownloadEvent::Error("boom".to_string()),
                DownloadEvent::Complete {
                    success: false,
                    message: "boom".to_string()
                },
            ]
        );
        assert!(received[3].is_complete());
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (observer, events) = ChannelObserver::new();
        drop(events);
        observer.on_complete(true, "done");
    }
}
