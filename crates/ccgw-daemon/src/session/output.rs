//! Output queue between a session's stdout reader and its consumer.
//!
//! Records are delivered in the order they were pushed. The producer side
//! terminates the queue with a single end-of-stream marker; the consumer
//! side is handed out once and ends on that marker, on a closed channel, or
//! when no record arrives within the configured timeout.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ccgw_core::EventRecord;
use futures::Stream;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

/// Event records produced by a session.
pub type EventStream = Pin<Box<dyn Stream<Item = EventRecord> + Send>>;

#[derive(Debug)]
enum QueueItem {
    Record(EventRecord),
    End,
}

/// Create a connected sender/queue pair.
pub fn output_channel(timeout: Duration) -> (OutputSender, OutputQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OutputSender {
            tx,
            ended: Arc::new(AtomicBool::new(false)),
        },
        OutputQueue {
            rx: Mutex::new(Some(rx)),
            timeout,
        },
    )
}

/// Producer half.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: mpsc::UnboundedSender<QueueItem>,
    ended: Arc<AtomicBool>,
}

impl OutputSender {
    /// Enqueue a record. Returns `false` once the queue has been finished.
    pub fn push(&self, record: EventRecord) -> bool {
        if self.ended.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(QueueItem::Record(record)).is_ok()
    }

    /// Enqueue the end-of-stream marker. Only the first call has an effect.
    pub fn finish(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(QueueItem::End);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct OutputQueue {
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueueItem>>>,
    timeout: Duration,
}

impl OutputQueue {
    /// Take the record stream. The queue is single-pass: later calls get an
    /// empty stream.
    pub async fn take_stream(&self, session_id: String) -> EventStream {
        let Some(mut rx) = self.rx.lock().await.take() else {
            debug!(session_id, "Output already consumed");
            return Box::pin(futures::stream::empty());
        };
        let timeout = self.timeout;

        Box::pin(async_stream::stream! {
            loop {
                match tokio::time::timeout(timeout, rx.recv()).await {
                    Ok(Some(QueueItem::Record(record))) => yield record,
                    Ok(Some(QueueItem::End)) => {
                        debug!(session_id, "Output stream ended");
                        break;
                    }
                    Ok(None) => {
                        warn!(session_id, "Output channel closed without end marker");
                        break;
                    }
                    Err(_) => {
                        warn!(
                            session_id,
                            timeout_secs = timeout.as_secs(),
                            "Output timeout"
                        );
                        break;
                    }
                }
            }
        })
    }
}
