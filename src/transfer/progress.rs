//! Progress signal channel
//!
//! A transfer drives one [`ProgressReporter`]; a renderer owns the matching
//! receiver and runs as its own task. The reporter enforces the event order
//! (`Resolving?`, `Start`, `Progress*`, `Finish`) regardless of how the
//! engine calls it.

use tokio::sync::mpsc;
use tracing::trace;

/// One notification of a single transfer's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Size not known yet; the renderer shows an indeterminate spinner
    Resolving { name: String },
    /// The transfer of `total_size` bytes begins
    Start { name: String, total_size: u64 },
    /// Cumulative bytes transferred so far
    Progress { bytes_transferred: u64 },
    /// Terminal event; nothing follows it
    Finish { success: bool },
}

pub type ProgressReceiver = mpsc::UnboundedReceiver<TransferEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Resolving,
    Started,
}

/// Producer side of one transfer's event stream
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<TransferEvent>>,
    stage: Stage,
    total: u64,
    last: u64,
}

impl ProgressReporter {
    /// Reporter feeding `tx`
    pub fn new(tx: mpsc::UnboundedSender<TransferEvent>) -> Self {
        Self {
            tx: Some(tx),
            stage: Stage::Idle,
            total: 0,
            last: 0,
        }
    }

    /// Reporter that discards every event
    pub fn disabled() -> Self {
        Self {
            tx: None,
            stage: Stage::Idle,
            total: 0,
            last: 0,
        }
    }

    /// A connected reporter/receiver pair for one transfer
    pub fn channel() -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn emit(&self, event: TransferEvent) {
        trace!("progress event: {:?}", event);
        if let Some(tx) = &self.tx {
            // a renderer that went away must not fail the transfer
            let _ = tx.send(event);
        }
    }

    /// Announce a transfer whose size is still being looked up
    pub fn resolving(&mut self, name: &str) {
        if self.stage == Stage::Idle {
            self.stage = Stage::Resolving;
            self.emit(TransferEvent::Resolving { name: name.to_string() });
        }
    }

    /// Announce the start of the transfer. Only the first call emits.
    pub fn start(&mut self, name: &str, total_size: u64) {
        if self.stage == Stage::Started {
            return;
        }
        self.stage = Stage::Started;
        self.total = total_size;
        self.emit(TransferEvent::Start {
            name: name.to_string(),
            total_size,
        });
    }

    /// Report cumulative progress. Ignored before `start` and when it
    /// would move backwards; clamped to the announced size.
    pub fn progress(&mut self, bytes_transferred: u64) {
        if self.stage != Stage::Started {
            return;
        }
        let bytes = bytes_transferred.min(self.total);
        if bytes < self.last {
            return;
        }
        self.last = bytes;
        self.emit(TransferEvent::Progress { bytes_transferred: bytes });
    }

    /// Bytes reported so far
    pub fn reported(&self) -> u64 {
        self.last
    }

    pub fn has_begun(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// Terminate the stream. Consumes the reporter so nothing can follow.
    ///
    /// Emits only when `resolving` or `start` was emitted before; a transfer
    /// rejected up front produces no events at all.
    pub fn finish(self, success: bool) {
        if self.has_begun() {
            self.emit(TransferEvent::Finish { success });
        }
    }
}

/// Check that an event sequence obeys the per-transfer ordering contract
pub fn is_well_ordered(events: &[TransferEvent]) -> bool {
    let mut starts = 0;
    let mut finishes = 0;
    let mut last = 0u64;
    let mut total = 0u64;

    for (i, event) in events.iter().enumerate() {
        if finishes > 0 {
            return false;
        }
        match event {
            TransferEvent::Resolving { .. } => {
                if i != 0 {
                    return false;
                }
            }
            TransferEvent::Start { total_size, .. } => {
                starts += 1;
                total = *total_size;
            }
            TransferEvent::Progress { bytes_transferred } => {
                if starts != 1 || *bytes_transferred < last || *bytes_transferred > total {
                    return false;
                }
                last = *bytes_transferred;
            }
            TransferEvent::Finish { .. } => finishes += 1,
        }
    }

    starts <= 1 && finishes == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut ProgressReceiver) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_ordering_is_enforced() {
        let (mut reporter, mut rx) = ProgressReporter::channel();
        reporter.progress(10);
        reporter.start("a.bin", 100);
        reporter.start("a.bin", 100);
        reporter.progress(40);
        reporter.progress(30);
        reporter.progress(500);
        reporter.finish(true);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                TransferEvent::Start { name: "a.bin".into(), total_size: 100 },
                TransferEvent::Progress { bytes_transferred: 40 },
                TransferEvent::Progress { bytes_transferred: 100 },
                TransferEvent::Finish { success: true },
            ]
        );
        assert!(is_well_ordered(&events));
    }

    #[test]
    fn test_resolving_precedes_start() {
        let (mut reporter, mut rx) = ProgressReporter::channel();
        reporter.resolving("remote.iso");
        reporter.start("remote.iso", 5);
        reporter.finish(false);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TransferEvent::Resolving { .. }));
        assert!(is_well_ordered(&events));
    }

    #[test]
    fn test_finish_without_begin_is_silent() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.finish(false);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (mut reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.start("x", 1);
        reporter.progress(1);
        reporter.finish(true);
    }

    #[test]
    fn test_is_well_ordered_rejects_bad_streams() {
        let finish = TransferEvent::Finish { success: true };
        let start = TransferEvent::Start { name: "x".into(), total_size: 10 };
        assert!(!is_well_ordered(&[]));
        assert!(!is_well_ordered(&[finish.clone(), start.clone()]));
        assert!(!is_well_ordered(&[start.clone(), start.clone(), finish.clone()]));
        assert!(!is_well_ordered(&[
            start.clone(),
            TransferEvent::Progress { bytes_transferred: 5 },
            TransferEvent::Progress { bytes_transferred: 4 },
            finish.clone(),
        ]));
        assert!(is_well_ordered(&[start, finish]));
    }
}
