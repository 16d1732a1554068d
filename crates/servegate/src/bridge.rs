//! Bridges a blocking upstream response iterator into an async message
//! sequence. A worker on the blocking thread pool pulls from upstream and
//! pushes tagged messages onto a bounded channel; the async consumer pops
//! them off. If the consumer goes away, channel sends start failing and the
//! worker stops pulling from upstream instead of running to completion.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use unistream::EndpointFormat;

const CHANNEL_CAPACITY: usize = 16;

/// One message on the bridge channel. Every logical stream carries zero or
/// more `Chunk`s followed by exactly one terminal (`Done` or `Error`).
#[derive(Debug)]
pub enum StreamMessage {
    Chunk { raw: Value, format: EndpointFormat },
    Done,
    Error(String),
}

/// Sending half of the bridge, handed to the blocking worker. Tracks
/// whether a terminal message has been sent so the terminal invariant
/// holds no matter how the worker exits.
pub struct StreamProducer {
    tx: mpsc::Sender<StreamMessage>,
    terminated: bool,
}

impl StreamProducer {
    /// Push one chunk. Returns `false` once the consumer has dropped the
    /// receiving half; the worker must stop pulling from upstream then.
    pub fn send_chunk(&mut self, raw: Value, format: EndpointFormat) -> bool {
        if self.terminated {
            return false;
        }
        if self
            .tx
            .blocking_send(StreamMessage::Chunk { raw, format })
            .is_err()
        {
            // Receiver dropped; nothing further can be delivered.
            self.terminated = true;
            return false;
        }
        true
    }

    pub fn done(&mut self) {
        self.send_terminal(StreamMessage::Done);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.send_terminal(StreamMessage::Error(message.into()));
    }

    fn send_terminal(&mut self, message: StreamMessage) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        let _ = self.tx.blocking_send(message);
    }
}

/// Run `worker` on the blocking thread pool and return the receiving half
/// of its channel. The worker is wrapped so that a panic, or an exit
/// without a terminal message, still yields exactly one `Error` terminal.
pub fn spawn_bridge<F>(worker: F) -> mpsc::Receiver<StreamMessage>
where
    F: FnOnce(&mut StreamProducer) + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let mut producer = StreamProducer {
            tx,
            terminated: false,
        };

        match catch_unwind(AssertUnwindSafe(|| worker(&mut producer))) {
            Ok(()) => {
                producer.error("stream worker exited without a terminal message");
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stream worker panicked".to_string());
                warn!(error = %message, "stream worker panicked");
                producer.error(message);
            }
        }
    });

    rx
}
