//! Threaded pipeline stages
//!
//! [`spawn_stage`] moves a stream onto its own worker thread. The worker
//! pulls from the stream at its own pace and pushes results through a
//! bounded channel, so a slow consumer applies backpressure instead of
//! letting records pile up.
//!
//! A stage stops when its stream ends, when it yields an error, or when it
//! is cancelled through its [`CancelToken`]. A worker waiting on a full
//! queue polls the token, so cancelling stops it even if the consumer never
//! calls `next()` again. Dropping a [`ThreadedStream`] cancels the worker,
//! disconnects the channel and joins the thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{HexError, Result};
use crate::record::{Progress, Record};
use crate::stream::RecordStream;

/// Default number of records buffered between a stage and its consumer
pub const DEFAULT_STAGE_CAPACITY: usize = 16;

/// How long a worker parks on a full queue before checking for cancellation
const SEND_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Shared flag asking a stage to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Consumer side of a stage running on a worker thread
#[derive(Debug)]
pub struct ThreadedStream {
    rx: Option<Receiver<Result<Record>>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancelToken,
    total: Option<u64>,
    consumed: u64,
    finished: bool,
}

/// Run `stream` on a new worker thread behind a channel of `capacity`
/// records (0 makes every hand-off a rendezvous)
pub fn spawn_stage<S>(stream: S, capacity: usize) -> Result<ThreadedStream>
where
    S: RecordStream + Send + 'static,
{
    let total = stream.progress().total;
    let (tx, rx) = mpsc::sync_channel(capacity);
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let worker = thread::Builder::new()
        .name("rbsl-stage".into())
        .spawn(move || run_stage(stream, tx, token))?;

    Ok(ThreadedStream {
        rx: Some(rx),
        worker: Some(worker),
        cancel,
        total,
        consumed: 0,
        finished: false,
    })
}

fn run_stage<S: RecordStream>(mut stream: S, tx: SyncSender<Result<Record>>, cancel: CancelToken) {
    while !cancel.is_cancelled() {
        let Some(item) = stream.next() else {
            break;
        };
        let failed = item.is_err();
        if !send(&tx, item, &cancel) {
            return;
        }
        if failed {
            return;
        }
    }
    if cancel.is_cancelled() {
        debug!("stage cancelled");
    }
}

/// Hand `item` to the consumer, giving up if the stage is cancelled or the
/// consumer hangs up while the queue is full
fn send(tx: &SyncSender<Result<Record>>, mut item: Result<Record>, cancel: &CancelToken) -> bool {
    loop {
        match tx.try_send(item) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                if cancel.is_cancelled() {
                    debug!("stage cancelled with a full queue");
                    return false;
                }
                item = back;
                thread::park_timeout(SEND_POLL_INTERVAL);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("stage consumer disconnected");
                return false;
            }
        }
    }
}

impl ThreadedStream {
    /// Token that cancels this stage when triggered from any thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Records still queued are discarded; later calls to `next()` return
    /// `None`.
    pub fn cancel(&mut self) {
        self.shutdown();
        self.finished = true;
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        // Disconnect first so a worker blocked in send() wakes up
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("stage worker panicked");
            }
        }
    }
}

impl Iterator for ThreadedStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.cancel();
            return Some(Err(HexError::Cancelled));
        }

        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(Ok(record)) => {
                // A slot just opened up; wake a worker parked on a full queue
                if let Some(worker) = &self.worker {
                    worker.thread().unpark();
                }
                self.consumed += record.len() as u64;
                Some(Ok(record))
            }
            Ok(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            Err(_) if self.cancel.is_cancelled() => {
                self.cancel();
                Some(Err(HexError::Cancelled))
            }
            Err(_) => {
                // Worker hung up: either its stream ended or it panicked
                self.finished = true;
                self.rx.take();
                match self.worker.take().map(JoinHandle::join) {
                    Some(Err(_)) => {
                        warn!("stage worker panicked");
                        Some(Err(HexError::WorkerPanicked))
                    }
                    _ => None,
                }
            }
        }
    }
}

impl RecordStream for ThreadedStream {
    fn progress(&self) -> Progress {
        Progress::new(self.consumed, self.total)
    }
}

impl Drop for ThreadedStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ihex::IntelHexParser;
    use crate::reblock::ReblockOptions;
    use crate::record::RecordSequence;

    /// Endless stream of one-byte records that reports when it is dropped
    struct Endless {
        next_addr: u32,
        dropped: Arc<AtomicBool>,
    }

    impl Iterator for Endless {
        type Item = Result<Record>;

        fn next(&mut self) -> Option<Self::Item> {
            let record = Record::new(self.next_addr, vec![self.next_addr as u8]);
            self.next_addr = self.next_addr.wrapping_add(1);
            Some(Ok(record))
        }
    }

    impl RecordStream for Endless {
        fn progress(&self) -> Progress {
            Progress::default()
        }
    }

    impl Drop for Endless {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn endless() -> (Endless, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Endless {
                next_addr: 0,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }

    /// Yields one record, then panics
    struct Panicky {
        yielded: bool,
    }

    impl Iterator for Panicky {
        type Item = Result<Record>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.yielded {
                panic!("upstream failure");
            }
            self.yielded = true;
            Some(Ok(Record::new(0, vec![1, 2])))
        }
    }

    impl RecordStream for Panicky {
        fn progress(&self) -> Progress {
            Progress::default()
        }
    }

    fn wait_for(flag: &AtomicBool) -> bool {
        for _ in 0..200 {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn sample() -> RecordSequence {
        RecordSequence::from(
            (0..50u32)
                .map(|i| Record::new(i * 3, vec![i as u8; 3]))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_same_order_as_pull() {
        let seq = sample();
        let options = ReblockOptions::new(8);
        let pulled: Vec<_> = seq
            .iter_records()
            .reblock(options)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        for capacity in [0, 1, DEFAULT_STAGE_CAPACITY] {
            let threaded: Vec<_> = seq
                .iter_records()
                .threaded(capacity)
                .unwrap()
                .reblock(options)
                .unwrap()
                .threaded(capacity)
                .unwrap()
                .map(|r| r.unwrap())
                .collect();
            assert_eq!(threaded, pulled, "capacity {}", capacity);
        }
    }

    #[test]
    fn test_progress_total_captured() {
        let seq = sample();
        let mut stream = seq.iter_records().threaded(4).unwrap();
        assert_eq!(stream.progress(), Progress::new(0, Some(150)));
        stream.next().unwrap().unwrap();
        assert_eq!(stream.progress(), Progress::new(3, Some(150)));
    }

    #[test]
    fn test_error_forwarded() {
        let text = ":03000000010203F7\n:0300300002337A1F\n:00000001FF\n";
        let mut stream = IntelHexParser::new(text.as_bytes()).threaded(1).unwrap();
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(stream.next(), Some(Err(HexError::Checksum { .. }))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_drop_joins_blocked_worker() {
        let (source, dropped) = endless();
        let mut stream = spawn_stage(source, 2).unwrap();
        for _ in 0..5 {
            stream.next().unwrap().unwrap();
        }
        drop(stream);
        // The worker owned the source; it is gone once drop() has joined
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_token() {
        let (source, dropped) = endless();
        let mut stream = spawn_stage(source, 2).unwrap();
        let token = stream.cancel_token();
        stream.next().unwrap().unwrap();

        token.cancel();
        assert!(matches!(stream.next(), Some(Err(HexError::Cancelled))));
        assert!(stream.next().is_none());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_method() {
        let (source, dropped) = endless();
        let mut stream = spawn_stage(source, 0).unwrap();
        stream.next().unwrap().unwrap();
        stream.cancel();
        assert!(stream.next().is_none());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_token_stops_blocked_worker() {
        let (source, dropped) = endless();
        let mut stream = spawn_stage(source, 1).unwrap();
        let token = stream.cancel_token();

        // Let the worker fill the queue and wait on it, with no consumer
        thread::sleep(Duration::from_millis(100));
        assert!(!dropped.load(Ordering::SeqCst));

        token.cancel();
        assert!(wait_for(&dropped), "worker kept running after cancel");

        assert!(matches!(stream.next(), Some(Err(HexError::Cancelled))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_worker_panic_is_an_error() {
        let results: Vec<_> = spawn_stage(Panicky { yielded: false }, 4)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &Record::new(0, vec![1, 2]));
        assert!(matches!(results[1], Err(HexError::WorkerPanicked)));
    }

    #[test]
    fn test_clean_end_is_not_an_error() {
        let results: Vec<_> = sample().iter_records().threaded(2).unwrap().collect();
        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
