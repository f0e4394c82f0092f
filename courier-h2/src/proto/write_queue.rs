use std::io;

use tokio::sync::{mpsc, oneshot};

use crate::frame::Frame;
use crate::proto::registry::Token;

/// A command consumed by the writer task.
///
/// Commands execute strictly in submission order. Frame commands carry an
/// optional completion handle and an optional originating stream, so a write
/// failure can be attached to the stream it was written for.
#[derive(Debug)]
pub(crate) enum Command {
    Frame {
        frame: Frame,
        flush: bool,
        on_behalf: Option<Token>,
        done: Option<oneshot::Sender<io::Result<()>>>,
    },
    /// Run admission for the given stream on the writer task: reject after
    /// go-away, queue when at the concurrency cap, otherwise assign the next
    /// stream id and emit HEADERS (plus any already-submitted DATA).
    CreateStream(Token),
    /// Capacity may have been freed; start pending streams FIFO while it
    /// lasts.
    DrainPending,
    /// Close the underlying connection and exit the writer task.
    Shutdown,
}

/// Completion handle for one enqueued command.
///
/// Dropping the handle detaches from the command without cancelling it.
#[derive(Debug)]
pub(crate) struct WriteHandle {
    done: oneshot::Receiver<io::Result<()>>,
}

impl WriteHandle {
    /// Wait until the command was written (and flushed, if requested) or
    /// failed.
    pub(crate) async fn finished(self) -> io::Result<()> {
        match self.done.await {
            Ok(result) => result,
            // The writer dropped the command without executing it; the
            // transport is tearing down.
            Err(_) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "write queue closed",
            )),
        }
    }
}

/// The submission side of the write queue.
///
/// Commands submitted before the transport binds its codec are buffered in
/// the channel and released in order once the writer task starts.
#[derive(Debug, Clone)]
pub(crate) struct WriteQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl WriteQueue {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a frame. Returns false when the queue is closed (the
    /// transport has terminated).
    pub(crate) fn enqueue(&self, frame: Frame, flush: bool, on_behalf: Option<Token>) -> bool {
        self.tx
            .send(Command::Frame {
                frame,
                flush,
                on_behalf,
                done: None,
            })
            .is_ok()
    }

    /// Enqueue a frame and obtain a completion handle for it.
    pub(crate) fn enqueue_tracked(
        &self,
        frame: Frame,
        flush: bool,
        on_behalf: Option<Token>,
    ) -> Option<WriteHandle> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Frame {
                frame,
                flush,
                on_behalf,
                done: Some(done_tx),
            })
            .ok()?;
        Some(WriteHandle { done: done_rx })
    }

    pub(crate) fn create_stream(&self, token: Token) -> bool {
        self.tx.send(Command::CreateStream(token)).is_ok()
    }

    pub(crate) fn drain_pending(&self) -> bool {
        self.tx.send(Command::DrainPending).is_ok()
    }

    pub(crate) fn shutdown(&self) -> bool {
        self.tx.send(Command::Shutdown).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Ping, Settings};

    #[test]
    fn commands_come_out_in_submission_order() {
        let (queue, mut rx) = WriteQueue::new();
        assert!(queue.enqueue(Settings::ack().into(), false, None));
        assert!(queue.enqueue(Ping::new(*b"pingping").into(), true, None));
        assert!(queue.shutdown());

        assert!(matches!(
            rx.try_recv().unwrap(),
            Command::Frame {
                frame: Frame::Settings(_),
                ..
            }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Command::Frame {
                frame: Frame::Ping(_),
                flush: true,
                ..
            }
        ));
        assert!(matches!(rx.try_recv().unwrap(), Command::Shutdown));
    }

    #[test]
    fn enqueue_after_close_reports_failure() {
        let (queue, rx) = WriteQueue::new();
        drop(rx);
        assert!(!queue.enqueue(Settings::ack().into(), false, None));
        assert!(queue.enqueue_tracked(Settings::ack().into(), false, None).is_none());
    }

    #[tokio::test]
    async fn dropped_command_fails_its_handle() {
        let (queue, mut rx) = WriteQueue::new();
        let handle = queue
            .enqueue_tracked(Settings::ack().into(), false, None)
            .unwrap();
        // Simulate teardown: the writer drops the command unexecuted.
        drop(rx.recv().await);
        drop(rx);
        assert!(handle.finished().await.is_err());
    }
}
