//! Live event stream for debugging mappings
//!
//! Runs a second reader on its own thread and publishes normalized button
//! and axis events into a bounded queue. When the queue is full new events
//! are dropped so the reader never blocks on a slow consumer. The monitor
//! never touches key state or the HID output.

use super::{normalize, NormalizedEvent};
use crate::device::{CancelToken, DeviceError, InputSource};
use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default queue depth for the event stream
pub const MONITOR_QUEUE_CAPACITY: usize = 100;

/// How long one blocking read may take before the cancel flag is rechecked
const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Background reader publishing normalized events
pub struct EventMonitor {
    events: Receiver<NormalizedEvent>,
    done: Receiver<()>,
    cancel: CancelToken,
    dropped: Arc<AtomicU64>,
    handle: Option<JoinHandle<Result<(), DeviceError>>>,
}

impl EventMonitor {
    /// Start reading from `source` with the default queue depth
    pub fn spawn<S>(source: S) -> io::Result<Self>
    where
        S: InputSource + Send + 'static,
    {
        Self::with_capacity(source, MONITOR_QUEUE_CAPACITY)
    }

    pub fn with_capacity<S>(source: S, capacity: usize) -> io::Result<Self>
    where
        S: InputSource + Send + 'static,
    {
        let (event_tx, events) = mpsc::sync_channel(capacity);
        let (done_tx, done) = mpsc::channel();
        let cancel = CancelToken::new();
        let dropped = Arc::new(AtomicU64::new(0));

        let thread_cancel = cancel.clone();
        let thread_dropped = Arc::clone(&dropped);
        let handle = thread::Builder::new()
            .name("event-monitor".to_string())
            .spawn(move || {
                let result = reader_loop(source, event_tx, &thread_cancel, &thread_dropped);
                let _ = done_tx.send(());
                result
            })?;

        Ok(Self {
            events,
            done,
            cancel,
            dropped,
            handle: Some(handle),
        })
    }

    /// The consuming end of the stream
    pub fn events(&self) -> &Receiver<NormalizedEvent> {
        &self.events
    }

    /// Next event, waiting at most `timeout`
    pub fn next_event(&self, timeout: Duration) -> Option<NormalizedEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Number of events discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the reader thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the reader to stop and wait up to `timeout` for it.
    ///
    /// Returns the reader's own result, or `None` if it did not finish in
    /// time (the thread is then left to exit on its own).
    pub fn stop(mut self, timeout: Duration) -> Option<Result<(), DeviceError>> {
        self.cancel.cancel();

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!("Event monitor did not stop within {:?}", timeout);
                return None;
            }
        }

        let handle = self.handle.take()?;
        match handle.join() {
            Ok(result) => Some(result),
            Err(_) => Some(Err(DeviceError::Disconnected(
                "event monitor panicked".to_string(),
            ))),
        }
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn reader_loop<S: InputSource>(
    mut source: S,
    events: SyncSender<NormalizedEvent>,
    cancel: &CancelToken,
    dropped: &AtomicU64,
) -> Result<(), DeviceError> {
    debug!("Event monitor reading from {}", source.label());

    while !cancel.is_cancelled() {
        for raw in source.read_events(MONITOR_POLL_INTERVAL)? {
            let event = normalize(&raw);
            if !event.class.is_mappable() {
                continue;
            }

            match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if total == 1 || total % 100 == 0 {
                        warn!("Event stream full, dropped {} ({} total)", event, total);
                    }
                }
                // Nobody is listening any more
                Err(TrySendError::Disconnected(_)) => return Ok(()),
            }
        }
    }

    debug!("Event monitor stopped");
    Ok(())
}
