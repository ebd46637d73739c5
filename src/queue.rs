//! Per-whiteboard inbound queue and backpressure signaling (§5).
//!
//! Grounded on the teacher's `enterprise::collaboration::sync_engine::SyncEngine`
//! use of `tokio::sync::mpsc` as the single entry point into a partition's
//! owned state, extended with the spec's two-tier backlog/in-flight caps and
//! STRESSED/CRITICAL signaling.

use tokio::sync::mpsc;

use crate::error::Error;

/// Backlog pressure, reported alongside a successful enqueue so callers can
/// react (e.g. slow down) before backpressure starts shedding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureSignal {
    /// Backlog comfortably below either threshold.
    Nominal,
    /// Backlog at or above 80% of the configured depth.
    Stressed,
    /// Backlog at or above 90% of the configured depth; the caller should
    /// start shedding its lowest-priority backlog rather than wait for the
    /// queue itself to fill (spec §5).
    Critical,
}

/// A bounded inbound channel for one class of request (element operations or
/// selection updates) on one whiteboard partition.
pub struct BoundedQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Option<mpsc::Receiver<T>>,
    depth: usize,
}

impl<T> BoundedQueue<T> {
    /// Build a queue with room for `depth` backlogged items.
    pub fn new(depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel(depth.max(1));
        Self {
            sender,
            receiver: Some(receiver),
            depth: depth.max(1),
        }
    }

    /// Take the receiving half, for the partition's owning task to drain. Can
    /// only be taken once; subsequent calls return `None`.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<T>> {
        self.receiver.take()
    }

    /// Enqueue `item`, shedding with [`Error::QueueBackpressure`] if the queue
    /// is full rather than blocking the submitter (spec §5: "backpressure...
    /// rather than blocking indefinitely"). `try_send` never blocks, so this
    /// needs no `async` runtime of its own — callers that do run inside one
    /// can still call it directly.
    pub fn try_enqueue(&self, item: T) -> Result<PressureSignal, Error> {
        self.sender
            .try_send(item)
            .map_err(|_| Error::QueueBackpressure)?;
        Ok(self.pressure())
    }

    /// Current backlog pressure, based on the sender's reported capacity.
    /// STRESSED at 80% of depth, CRITICAL at 90% (spec §5).
    pub fn pressure(&self) -> PressureSignal {
        let available = self.sender.capacity();
        let used = self.depth.saturating_sub(available);
        let used_pct = (used * 100) / self.depth;
        if used_pct >= 90 {
            PressureSignal::Critical
        } else if used_pct >= 80 {
            PressureSignal::Stressed
        } else {
            PressureSignal::Nominal
        }
    }
}

/// Tracks in-flight request count for one request class, enforcing the
/// configured concurrency cap independent of backlog depth.
pub struct InFlightGuard {
    max: usize,
    current: usize,
}

impl InFlightGuard {
    /// Build a guard allowing at most `max` concurrent in-flight requests.
    pub fn new(max: usize) -> Self {
        Self { max: max.max(1), current: 0 }
    }

    /// Attempt to reserve one in-flight slot.
    pub fn try_acquire(&mut self) -> Result<(), Error> {
        if self.current >= self.max {
            return Err(Error::QueueBackpressure);
        }
        self.current += 1;
        Ok(())
    }

    /// Release a previously acquired slot.
    pub fn release(&mut self) {
        self.current = self.current.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_reports_pressure() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(10);
        for i in 0..7 {
            assert_eq!(queue.try_enqueue(i).unwrap(), PressureSignal::Nominal);
        }
        assert_eq!(queue.try_enqueue(7).unwrap(), PressureSignal::Stressed); // 8/10 = 80%
        assert_eq!(queue.try_enqueue(8).unwrap(), PressureSignal::Critical); // 9/10 = 90%
    }

    #[test]
    fn enqueue_sheds_when_full() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(1);
        queue.try_enqueue(1).unwrap();
        assert!(matches!(queue.try_enqueue(2), Err(Error::QueueBackpressure)));
    }

    #[test]
    fn in_flight_guard_caps_concurrency() {
        let mut guard = InFlightGuard::new(1);
        guard.try_acquire().unwrap();
        assert!(guard.try_acquire().is_err());
        guard.release();
        assert!(guard.try_acquire().is_ok());
    }
}
