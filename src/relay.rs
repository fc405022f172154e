//! Frame relay between the SDK callback context and the consumer loop.
//!
//! The drone SDK delivers frames from its own internal thread; the consumer
//! loop runs on ours. [`FrameRelay`] is the hand-off point: an unbounded
//! channel whose producer side never blocks the SDK callback, plus a flush
//! operation that drains and releases everything buffered when upstream
//! signals a discontinuity (stream restart), so stale frames are never
//! processed.
//!
//! There is no back-pressure: if the consumer falls behind, the queue grows.
//! That matches the upstream contract: `push` must not fail and must not
//! block inside the SDK's callback context.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::frame::FrameRef;

/// Producer/consumer hand-off queue for video frames.
///
/// Handles are cheap to clone; the SDK frame callback, the flush callback,
/// and the consumer loop each hold one. Individual `push`/`pop` calls are
/// atomic on their own; only `flush` needs the exclusive lock.
#[derive(Clone)]
pub struct FrameRelay {
    tx: Sender<FrameRef>,
    rx: Receiver<FrameRef>,
    flush_lock: Arc<Mutex<()>>,
}

impl FrameRelay {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Non-blocking enqueue. Takes ownership of the frame's reference; the
    /// reference is released by whoever dequeues it (or by `flush`).
    pub fn push(&self, frame: FrameRef) {
        // The channel cannot disconnect while a relay handle holds `rx`.
        let _ = self.tx.send(frame);
    }

    /// Dequeue with a timeout. `None` is an empty poll, not an error; the
    /// short timeout keeps the consumer loop responsive to shutdown.
    pub fn pop(&self, timeout: Duration) -> Option<FrameRef> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain the queue and release every buffered frame. Returns how many
    /// frames were discarded. Frames pushed after the drain are unaffected.
    pub fn flush(&self) -> usize {
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut drained = 0;
        while let Ok(frame) = self.rx.try_recv() {
            drop(frame);
            drained += 1;
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameLedger, PixelFormat, VideoFrame};

    fn test_frame(ledger: &FrameLedger) -> FrameRef {
        let data = vec![0u8; PixelFormat::I420.frame_len(4, 4)];
        ledger.issue(VideoFrame::new(PixelFormat::I420, 4, 4, data).unwrap())
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let relay = FrameRelay::new();
        assert!(relay.pop(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn push_then_pop_in_order() {
        let ledger = FrameLedger::new();
        let relay = FrameRelay::new();
        relay.push(test_frame(&ledger));
        relay.push(test_frame(&ledger));

        assert_eq!(relay.len(), 2);
        assert!(relay.pop(Duration::from_millis(1)).is_some());
        assert!(relay.pop(Duration::from_millis(1)).is_some());
        assert!(relay.pop(Duration::from_millis(1)).is_none());
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn flush_releases_everything_queued() {
        let ledger = FrameLedger::new();
        let relay = FrameRelay::new();
        for _ in 0..5 {
            relay.push(test_frame(&ledger));
        }
        assert_eq!(ledger.outstanding(), 5);

        assert_eq!(relay.flush(), 5);
        assert!(relay.is_empty());
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn frames_pushed_after_flush_are_unaffected() {
        let ledger = FrameLedger::new();
        let relay = FrameRelay::new();
        relay.push(test_frame(&ledger));
        relay.flush();

        relay.push(test_frame(&ledger));
        assert_eq!(relay.len(), 1);
        let frame = relay.pop(Duration::from_millis(1));
        assert!(frame.is_some());
        assert_eq!(ledger.outstanding(), 1);
        drop(frame);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn flush_on_empty_queue_is_a_no_op() {
        let relay = FrameRelay::new();
        assert_eq!(relay.flush(), 0);
    }

    #[test]
    fn producer_thread_can_push_while_consumer_pops() {
        let ledger = FrameLedger::new();
        let relay = FrameRelay::new();

        let producer = {
            let relay = relay.clone();
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    relay.push(test_frame(&ledger));
                }
            })
        };

        let mut received = 0;
        while received < 100 {
            if relay.pop(Duration::from_millis(10)).is_some() {
                received += 1;
            }
        }
        producer.join().unwrap();
        assert_eq!(ledger.outstanding(), 0);
    }
}
