//! Throttled status and error reporting for whoever is watching the client.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use log::{error, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Status,
    Error,
}

/// A single telemetry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

struct Buffer {
    queue: VecDeque<Notice>,
    last_flush: Option<Instant>,
    discarded: usize,
}

/// Buffers status messages and flushes them at most once per interval.
///
/// Errors are never throttled, they flush the queue right away. Flushed notices go to the
/// `log` facade and, if there is one, to the shell's channel.
pub struct Telemetry {
    buffer: Mutex<Buffer>,
    interval: Duration,
    capacity: usize,
    shell: Option<mpsc::UnboundedSender<Notice>>,
}

impl Telemetry {
    /// Creates a new `Telemetry`.
    ///
    /// # Arguments
    /// * `interval` - The minimum time between two status flushes.
    pub fn new(interval: Duration) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                queue: VecDeque::new(),
                last_flush: None,
                discarded: 0,
            }),
            interval,
            capacity: DEFAULT_CAPACITY,
            shell: None,
        }
    }

    /// Bounds the queue to `capacity` notices, the oldest are discarded first.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Forwards every flushed notice to `shell`.
    pub fn with_shell(mut self, shell: mpsc::UnboundedSender<Notice>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Queues a status message, flushing if the interval elapsed.
    pub fn status(&self, message: impl Into<String>) {
        let mut buffer = self.buffer.lock();
        self.push(&mut buffer, Level::Status, message.into());

        let due = buffer
            .last_flush
            .is_none_or(|last| last.elapsed() >= self.interval);

        if due {
            self.drain(&mut buffer);
        }
    }

    /// Queues an error and flushes right away.
    pub fn error(&self, message: impl Into<String>) {
        let mut buffer = self.buffer.lock();
        self.push(&mut buffer, Level::Error, message.into());
        self.drain(&mut buffer);
    }

    /// Flushes every queued notice.
    pub fn flush(&self) {
        let mut buffer = self.buffer.lock();
        self.drain(&mut buffer);
    }

    fn push(&self, buffer: &mut Buffer, level: Level, message: String) {
        if buffer.queue.len() == self.capacity {
            buffer.queue.pop_front();
            buffer.discarded += 1;
        }

        buffer.queue.push_back(Notice { level, message });
    }

    fn drain(&self, buffer: &mut Buffer) {
        buffer.last_flush = Some(Instant::now());

        if buffer.discarded > 0 {
            warn!(discarded = buffer.discarded; "telemetry queue overflowed");
            buffer.discarded = 0;
        }

        for notice in buffer.queue.drain(..) {
            match notice.level {
                Level::Status => info!("{}", notice.message),
                Level::Error => error!("{}", notice.message),
            }

            if let Some(shell) = &self.shell {
                // A closed shell is ignored.
                let _ = shell.send(notice);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notices(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            out.push(notice.message);
        }
        out
    }

    #[test]
    fn statuses_are_throttled_until_an_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let telemetry = Telemetry::new(Duration::from_secs(3600)).with_shell(tx);

        telemetry.status("first");
        assert_eq!(notices(&mut rx), ["first"]);

        telemetry.status("second");
        telemetry.status("third");
        assert!(notices(&mut rx).is_empty());

        telemetry.error("boom");
        assert_eq!(notices(&mut rx), ["second", "third", "boom"]);
    }

    #[test]
    fn a_full_queue_drops_the_oldest() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let telemetry = Telemetry::new(Duration::from_secs(3600))
            .with_capacity(2)
            .with_shell(tx);

        telemetry.flush();
        telemetry.status("a");
        telemetry.status("b");
        telemetry.status("c");
        telemetry.flush();

        assert_eq!(notices(&mut rx), ["b", "c"]);
    }

    #[test]
    fn a_zero_interval_never_throttles() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let telemetry = Telemetry::new(Duration::ZERO).with_shell(tx);

        telemetry.status("a");
        telemetry.status("b");
        assert_eq!(notices(&mut rx), ["a", "b"]);
    }
}
