//! Upload progress reporting.
//!
//! A reporter/stream pair backed by a `watch` channel: the stream always sees
//! the latest fraction, and a consumer that never reads it costs nothing.

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Create a connected reporter and stream, both starting at `0.0`.
pub fn progress_channel() -> (ProgressReporter, ProgressStream) {
    let (tx, rx) = watch::channel(0.0);
    (ProgressReporter { tx }, ProgressStream { rx })
}

/// Write side, handed to the blob store during `put`.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<f64>,
}

impl ProgressReporter {
    /// A reporter nobody listens to.
    pub fn detached() -> Self {
        progress_channel().0
    }

    /// Publish a fraction in `[0.0, 1.0]`.
    ///
    /// Values are clamped; a value lower than the last published one is
    /// ignored, so observers only ever see the fraction grow.
    pub fn report(&self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        self.tx.send_if_modified(|current| {
            if fraction > *current {
                *current = fraction;
                true
            } else {
                false
            }
        });
    }

    /// Publish `transferred / total`.
    pub fn report_bytes(&self, transferred: u64, total: u64) {
        if total == 0 {
            return;
        }
        self.report(transferred as f64 / total as f64);
    }

    pub fn complete(&self) {
        self.report(1.0);
    }

    pub fn current(&self) -> f64 {
        *self.tx.borrow()
    }
}

/// Read side, kept by whoever drives the upload UI.
#[derive(Debug, Clone)]
pub struct ProgressStream {
    rx: watch::Receiver<f64>,
}

impl ProgressStream {
    pub fn current(&self) -> f64 {
        *self.rx.borrow()
    }

    /// Wait for the next published fraction. `None` once the reporter is gone.
    pub async fn changed(&mut self) -> Option<f64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn into_stream(self) -> WatchStream<f64> {
        WatchStream::new(self.rx)
    }
}
