use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use crate::outbound::FrameStats;

/// One inbound camera frame.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub image: Vec<u8>,
    pub heading: f64,
}

/// Single-slot frame mailbox with drop-latest backpressure.
///
/// `submit` is non-blocking and never queues more than one frame: while a
/// dispatch is in flight the pending slot is overwritten (the older frame is
/// discarded and counted as skipped) and no new signal is raised — the
/// consumer re-checks the slot itself when it finishes. This guarantees the
/// consumer always claims the freshest frame available at dispatch time.
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<FramePayload>>,
    processing: AtomicBool,
    signal: Notify,
    received: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<FramePayload>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer side: deposit a frame without blocking.
    pub fn submit(&self, frame: FramePayload) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.slot();
        if self.processing.load(Ordering::Acquire) {
            // Busy: replace whatever is pending so the consumer grabs the
            // newest frame when it frees up. No signal; the consumer
            // re-checks on finish.
            *slot = Some(frame);
            self.skipped.fetch_add(1, Ordering::Relaxed);
        } else {
            *slot = Some(frame);
            self.signal.notify_one();
        }
    }

    /// Consumer side: atomically take the pending frame and mark the
    /// session as processing. Returns `None` while a dispatch is in flight
    /// or when the slot is empty (spurious wake).
    pub fn claim(&self) -> Option<FramePayload> {
        let mut slot = self.slot();
        if self.processing.load(Ordering::Acquire) {
            return None;
        }
        let frame = slot.take()?;
        self.processing.store(true, Ordering::Release);
        Some(frame)
    }

    /// Consumer side: dispatch finished. Re-raises the signal immediately if
    /// a frame arrived during processing, so no external submit is needed to
    /// resume.
    pub fn finish(&self) {
        let slot = self.slot();
        self.processing.store(false, Ordering::Release);
        if slot.is_some() {
            self.signal.notify_one();
        }
    }

    /// Resolves when a frame signal is raised. A permit raised while nobody
    /// was waiting is not lost.
    pub async fn signalled(&self) {
        self.signal.notified().await;
    }

    pub fn note_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
