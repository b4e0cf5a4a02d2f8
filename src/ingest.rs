// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/ingest.rs
//
// Moves telemetry from the transport into the sample buffer. Two ways to
// run it: drained from the UI tick (polled) or on its own thread that
// blocks on the port read timeout (background).

use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::buffer::{Sample, SharedBuffer};
use crate::telemetry::{parse_line, LineAssembler, Reading};
use crate::transport::Transport;

/// Most bytes a polled tick will pull off the port.
pub const MAX_POLL_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestMode {
    Polled,
    Background,
}

impl IngestMode {
    pub const ALL: [IngestMode; 2] = [IngestMode::Polled, IngestMode::Background];
}

impl std::fmt::Display for IngestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestMode::Polled => write!(f, "Polled"),
            IngestMode::Background => write!(f, "Background thread"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Rejected { line: String, reason: String },
    Failed(String),
}

// ---------------- Clock ----------------

/// Host-side time base. Samples are stamped on arrival, not with device time.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

// ---------------- Ingestor ----------------

pub struct Ingestor {
    lines: LineAssembler,
    buffer: SharedBuffer,
    clock: SessionClock,
    events: Sender<IngestEvent>,
}

impl Ingestor {
    pub fn new(buffer: SharedBuffer, clock: SessionClock, events: Sender<IngestEvent>) -> Self {
        Self {
            lines: LineAssembler::new(),
            buffer,
            clock,
            events,
        }
    }

    /// Parse any complete lines in `bytes` and append the valid ones.
    /// Returns how many samples were appended.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut accepted = 0;

        for line in self.lines.push(bytes) {
            if line.trim().is_empty() {
                continue;
            }

            match parse_line(&line) {
                Reading::Valid(value) => {
                    let sample = Sample::new(self.clock.elapsed_secs(), value);
                    log::trace!("sample t={:.3} angle={}", sample.timestamp, value);
                    self.buffer.append(sample);
                    accepted += 1;
                }
                Reading::Reject(reason) => {
                    log::warn!("Dropping telemetry line {:?}: {}", line, reason);
                    let _ = self.events.send(IngestEvent::Rejected { line, reason });
                }
            }
        }

        accepted
    }

    /// Drain whatever the port already holds without blocking.
    pub fn poll(&mut self, transport: &mut dyn Transport) -> io::Result<usize> {
        let mut budget = MAX_POLL_BYTES;
        let mut accepted = 0;
        let mut chunk = [0u8; 512];

        while budget > 0 {
            let available = transport.bytes_available()?;
            if available == 0 {
                break;
            }

            let want = available.min(budget).min(chunk.len());
            let n = match transport.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => break,
                Err(e) => return Err(e),
            };
            if n == 0 {
                break;
            }

            budget -= n;
            accepted += self.feed(&chunk[..n]);
        }

        Ok(accepted)
    }

    fn report(&self, event: IngestEvent) {
        let _ = self.events.send(event);
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ---------------- Background reader ----------------

pub struct IngestWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IngestWorker {
    pub fn spawn(mut transport: Box<dyn Transport>, mut ingestor: Ingestor) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("serial-ingest".to_string())
            .spawn(move || {
                let mut buf = [0u8; 256];

                while !stop_flag.load(Ordering::Acquire) {
                    match transport.read(&mut buf) {
                        Ok(0) => {
                            log::error!("Serial port reported end of stream, stopping reader");
                            ingestor.report(IngestEvent::Failed("Port closed".to_string()));
                            break;
                        }
                        Ok(n) => {
                            // a stop request wins over data that raced in with it
                            if stop_flag.load(Ordering::Acquire) {
                                break;
                            }
                            ingestor.feed(&buf[..n]);
                        }
                        Err(e) if is_timeout(&e) => continue,
                        Err(e) => {
                            log::error!("Serial read failed, stopping reader: {}", e);
                            ingestor.report(IngestEvent::Failed(format!("Read error: {e}")));
                            break;
                        }
                    }
                }

                log::debug!("Serial reader exited");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Ask the reader to stop and wait for it. Returns within one read timeout.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Serial reader panicked");
            }
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn feed_appends_valid_lines_in_order() {
        let buffer = SharedBuffer::new(10);
        let (tx, rx) = channel();
        let mut ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);

        assert_eq!(ing.feed(b"10\n20\nabc\n\n30\n"), 3);

        let values: Vec<f64> = buffer.snapshot().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);

        let events: Vec<IngestEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], IngestEvent::Rejected { line, .. } if line == "abc"));
    }

    #[test]
    fn timestamps_come_from_the_host_clock() {
        let buffer = SharedBuffer::new(10);
        let (tx, _rx) = channel();
        let clock = SessionClock::start();
        let mut ing = Ingestor::new(buffer.clone(), clock, tx);

        ing.feed(b"1\n");
        thread::sleep(Duration::from_millis(20));
        ing.feed(b"2\n");

        let s = buffer.snapshot();
        assert!(s[0].timestamp >= 0.0);
        assert!(s[1].timestamp - s[0].timestamp >= 0.015);
        assert!(s[1].timestamp <= clock.elapsed_secs());
    }

    #[test]
    fn rejected_line_leaves_buffer_alone() {
        let buffer = SharedBuffer::new(10);
        let (tx, _rx) = channel();
        let mut ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);

        assert_eq!(ing.feed(b"abc\n"), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn poll_drains_available_bytes() {
        let buffer = SharedBuffer::new(10);
        let (tx, _rx) = channel();
        let mut ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);
        let (mut port, handle) = MockTransport::new();

        handle.feed(b"1.5\n2.5\n3");
        assert_eq!(ing.poll(&mut port).unwrap(), 2);
        assert_eq!(ing.poll(&mut port).unwrap(), 0);

        handle.feed(b".5\n");
        assert_eq!(ing.poll(&mut port).unwrap(), 1);
        let values: Vec<f64> = buffer.snapshot().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn poll_is_bounded_per_call() {
        let buffer = SharedBuffer::new(10_000);
        let (tx, _rx) = channel();
        let mut ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);
        let (mut port, handle) = MockTransport::new();

        // 2000 lines of "12\n" = 6000 bytes
        handle.feed(&b"12\n".repeat(2000));
        ing.poll(&mut port).unwrap();
        assert!(handle.wire().inbound.len() >= 6000 - MAX_POLL_BYTES);
        assert!(buffer.len() <= MAX_POLL_BYTES / 3);
    }

    #[test]
    fn worker_ingests_until_stopped() {
        let buffer = SharedBuffer::new(100);
        let (tx, _rx) = channel();
        let ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);
        let (port, handle) = MockTransport::new();

        let mut worker = IngestWorker::spawn(port.try_clone_transport().unwrap(), ing).unwrap();
        handle.feed(b"5\n6\n");
        assert!(wait_for(|| buffer.len() == 2));
        assert!(worker.is_running());

        worker.stop();
        assert!(!worker.is_running());

        handle.feed(b"7\n");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(buffer.len(), 2);
        drop(port);
    }

    #[test]
    fn worker_stops_and_reports_on_read_error() {
        let buffer = SharedBuffer::new(100);
        let (tx, rx) = channel();
        let ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);
        let (port, handle) = MockTransport::new();

        let worker = IngestWorker::spawn(port.try_clone_transport().unwrap(), ing).unwrap();
        handle.wire().fail_reads = true;

        assert!(wait_for(|| !worker.is_running()));
        let events: Vec<IngestEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, IngestEvent::Failed(_))));
    }

    #[test]
    fn worker_treats_end_of_stream_as_closed() {
        let buffer = SharedBuffer::new(100);
        let (tx, rx) = channel();
        let ing = Ingestor::new(buffer.clone(), SessionClock::start(), tx);
        let (port, handle) = MockTransport::new();

        handle.feed(b"8\n");
        handle.wire().eof = true;
        let worker = IngestWorker::spawn(port.try_clone_transport().unwrap(), ing).unwrap();

        assert!(wait_for(|| !worker.is_running()));
        assert_eq!(buffer.len(), 1);
        let events: Vec<IngestEvent> = rx.try_iter().collect();
        assert!(matches!(events.as_slice(), [IngestEvent::Failed(msg)] if msg == "Port closed"));
    }
}
