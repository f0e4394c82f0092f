use std::time::{Duration, Instant};

use courier_rpc::Status;
use tokio::sync::oneshot;

/// Tracks the single PING that may be outstanding on the connection.
///
/// Callers arriving while a PING is in flight attach to it and observe the
/// same round-trip sample when the ACK lands.
#[derive(Debug, Default)]
pub(crate) struct PingTracker {
    outstanding: Option<Outstanding>,
}

#[derive(Debug)]
struct Outstanding {
    payload: [u8; 8],
    started: Instant,
    waiters: Vec<oneshot::Sender<Result<Duration, Status>>>,
}

impl PingTracker {
    /// Attach a waiter. Returns the payload to put on the wire when this
    /// waiter is the one that opens a fresh PING; `None` means an earlier
    /// PING is still in flight and the waiter rides along.
    pub(crate) fn register(
        &mut self,
        payload: impl FnOnce() -> [u8; 8],
        waiter: oneshot::Sender<Result<Duration, Status>>,
    ) -> Option<[u8; 8]> {
        match &mut self.outstanding {
            Some(outstanding) => {
                outstanding.waiters.push(waiter);
                None
            }
            None => {
                let payload = payload();
                self.outstanding = Some(Outstanding {
                    payload,
                    started: Instant::now(),
                    waiters: vec![waiter],
                });
                Some(payload)
            }
        }
    }

    /// Handle an inbound PING ACK. On a payload match the round trip is
    /// complete: every waiter receives the same elapsed sample. A mismatch
    /// returns `None`; the caller logs and ignores it.
    pub(crate) fn on_ack(&mut self, payload: [u8; 8]) -> Option<Completion> {
        match &self.outstanding {
            Some(outstanding) if outstanding.payload == payload => {
                let outstanding = self.outstanding.take()?;
                Some(Completion {
                    elapsed: outstanding.started.elapsed(),
                    waiters: outstanding.waiters,
                })
            }
            _ => None,
        }
    }

    /// Fail the outstanding PING, if any, with the transport's terminal
    /// status. Returns the waiters to complete outside the lock.
    pub(crate) fn fail(&mut self) -> Vec<oneshot::Sender<Result<Duration, Status>>> {
        self.outstanding
            .take()
            .map(|outstanding| outstanding.waiters)
            .unwrap_or_default()
    }

    pub(crate) fn is_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }
}

/// A completed PING round trip, to be fanned out off-lock.
pub(crate) struct Completion {
    pub(crate) elapsed: Duration,
    pub(crate) waiters: Vec<oneshot::Sender<Result<Duration, Status>>>,
}

impl Completion {
    pub(crate) fn deliver(self) {
        for waiter in self.waiters {
            let _ = waiter.send(Ok(self.elapsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_caller_attaches_to_the_outstanding_ping() {
        let mut tracker = PingTracker::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();

        let payload = tracker.register(|| *b"payload1", tx1);
        assert_eq!(payload, Some(*b"payload1"));
        // The coalesced caller must not put a second PING on the wire.
        assert_eq!(tracker.register(|| *b"payload2", tx2), None);

        let completion = tracker.on_ack(*b"payload1").expect("matching ack");
        let elapsed = completion.elapsed;
        completion.deliver();

        assert_eq!(rx1.try_recv().unwrap().unwrap(), elapsed);
        assert_eq!(rx2.try_recv().unwrap().unwrap(), elapsed);
        assert!(!tracker.is_outstanding());
    }

    #[test]
    fn mismatched_ack_is_ignored() {
        let mut tracker = PingTracker::default();
        let (tx, mut rx) = oneshot::channel();
        tracker.register(|| *b"expected", tx);

        assert!(tracker.on_ack(*b"mismatch").is_none());
        assert!(tracker.is_outstanding());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsolicited_ack_is_ignored() {
        let mut tracker = PingTracker::default();
        assert!(tracker.on_ack(*b"whatever").is_none());
    }

    #[test]
    fn fail_hands_back_every_waiter() {
        let mut tracker = PingTracker::default();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        tracker.register(|| *b"someping", tx1);
        tracker.register(|| *b"someping", tx2);

        assert_eq!(tracker.fail().len(), 2);
        assert!(!tracker.is_outstanding());
        assert!(tracker.fail().is_empty());
    }
}
