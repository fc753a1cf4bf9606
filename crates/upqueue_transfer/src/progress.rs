use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Sending half of a unit's progress channel.
///
/// Clones share one high-water mark, so the receiver only ever sees a
/// strictly increasing sequence of percentages in `0..=100`.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<u8>,
    reported: Arc<AtomicU8>,
}

pub fn progress_channel() -> (ProgressReporter, mpsc::UnboundedReceiver<u8>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressReporter {
            tx,
            reported: Arc::new(AtomicU8::new(0)),
        },
        rx,
    )
}

impl ProgressReporter {
    pub fn report_percent(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.reported.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            let _ = self.tx.send(percent);
        }
    }

    pub fn report_bytes(&self, sent: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (sent.min(total) * 100 / total) as u8
        };
        self.report_percent(percent);
    }

    pub fn last_reported(&self) -> u8 {
        self.reported.load(Ordering::Acquire)
    }
}
