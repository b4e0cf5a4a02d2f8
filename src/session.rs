// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/session.rs
//
// One run of the panel: owns the sample buffer, the time base, the open
// port (if any) and whichever ingestion loop is feeding the buffer.
//
// Disconnected -> Connecting -> Connected -> Disconnected

use std::error::Error;
use std::io::{self, Write};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

use crate::buffer::{Sample, SharedBuffer};
use crate::command::{AnglePolicy, Command, CommandError, LineEnding, LoopMode};
use crate::ingest::{IngestEvent, IngestMode, IngestWorker, Ingestor, SessionClock};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Bytes written once, some time after connecting. Boards that reset when
/// the port opens need a moment before they listen.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub payload: Vec<u8>,
    pub delay: Duration,
}

#[derive(Debug)]
pub enum SendError {
    /// Input rejected before anything touched the port.
    Invalid(CommandError),
    NotConnected,
    Write(io::Error),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Invalid(e) => write!(f, "{}", e),
            SendError::NotConnected => write!(f, "Not connected."),
            SendError::Write(e) => write!(f, "Write failed: {}", e),
        }
    }
}

impl Error for SendError {}

impl From<CommandError> for SendError {
    fn from(e: CommandError) -> Self {
        SendError::Invalid(e)
    }
}

enum Reader {
    Polled(Ingestor),
    Background(IngestWorker),
}

struct Link {
    reader: Reader,
    writer: Box<dyn Transport>,
    events: Receiver<IngestEvent>,
    handshake: Option<(Instant, Vec<u8>)>,
}

pub struct Session {
    state: ConnectionState,
    buffer: SharedBuffer,
    clock: SessionClock,
    mode: IngestMode,
    link: Option<Link>,
}

impl Session {
    pub fn new(capacity: usize, mode: IngestMode) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            buffer: SharedBuffer::new(capacity),
            clock: SessionClock::start(),
            mode,
            link: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Takes effect on the next connect.
    pub fn set_mode(&mut self, mode: IngestMode) {
        self.mode = mode;
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Copy of the buffered samples for one render.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    /// Open a transport with `opener` and start ingesting from it.
    pub fn connect_with<F>(
        &mut self,
        opener: F,
        handshake: Option<Handshake>,
    ) -> Result<(), Box<dyn Error>>
    where
        F: FnOnce() -> Result<Box<dyn Transport>, Box<dyn Error>>,
    {
        if self.link.is_some() {
            return Err("Already connected. Use Disconnect.".into());
        }

        self.state = ConnectionState::Connecting;

        match self.start_link(opener, handshake) {
            Ok(link) => {
                self.link = Some(link);
                self.state = ConnectionState::Connected;
                log::info!("Connected ({} ingestion)", self.mode);
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                log::warn!("Connect failed: {}", e);
                Err(e)
            }
        }
    }

    fn start_link<F>(&self, opener: F, handshake: Option<Handshake>) -> Result<Link, Box<dyn Error>>
    where
        F: FnOnce() -> Result<Box<dyn Transport>, Box<dyn Error>>,
    {
        let writer = opener()?;
        let (tx, rx) = channel();
        let ingestor = Ingestor::new(self.buffer.clone(), self.clock, tx);

        let reader = match self.mode {
            IngestMode::Polled => Reader::Polled(ingestor),
            IngestMode::Background => {
                let port = writer.try_clone_transport()?;
                Reader::Background(IngestWorker::spawn(port, ingestor)?)
            }
        };

        Ok(Link {
            reader,
            writer,
            events: rx,
            handshake: handshake.map(|h| (Instant::now() + h.delay, h.payload)),
        })
    }

    /// Stop ingestion, then release the port. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Reader::Background(worker) = &mut link.reader {
                worker.stop();
            }
            drop(link);
            log::info!("Disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Write one command. Nothing is awaited or retried.
    pub fn send(&mut self, command: &Command, ending: LineEnding) -> Result<(), SendError> {
        let link = self.link.as_mut().ok_or(SendError::NotConnected)?;
        let wire = command.encode(ending);

        let res = link
            .writer
            .write_all(wire.as_bytes())
            .and_then(|_| link.writer.flush());

        match res {
            Ok(()) => {
                log::info!("Sent {:?}", wire);
                Ok(())
            }
            Err(e) => {
                log::warn!("Write of {:?} failed: {}", wire, e);
                Err(SendError::Write(e))
            }
        }
    }

    /// Validate the panel's input text and send it. Invalid input writes
    /// nothing. Returns the command that went out.
    pub fn send_input(
        &mut self,
        angle: &str,
        gains: [&str; 3],
        policy: AnglePolicy,
        mode: LoopMode,
        ending: LineEnding,
    ) -> Result<Command, SendError> {
        let command = Command::from_input(angle, gains, policy, mode)?;
        self.send(&command, ending)?;
        Ok(command)
    }

    /// Called on every render tick: sends a due handshake, drives polled
    /// ingestion and drains reader events. A read failure disconnects.
    pub fn tick(&mut self) -> Vec<IngestEvent> {
        let Some(link) = self.link.as_mut() else {
            return Vec::new();
        };

        if let Some((due, payload)) = link.handshake.take() {
            if Instant::now() >= due {
                match link.writer.write_all(&payload).and_then(|_| link.writer.flush()) {
                    Ok(()) => log::info!("Sent start command {:?}", String::from_utf8_lossy(&payload)),
                    Err(e) => log::warn!("Start command failed: {}", e),
                }
            } else {
                link.handshake = Some((due, payload));
            }
        }

        let mut events = Vec::new();

        if let Reader::Polled(ingestor) = &mut link.reader {
            if let Err(e) = ingestor.poll(link.writer.as_mut()) {
                log::error!("Serial read failed: {}", e);
                events.push(IngestEvent::Failed(format!("Read error: {e}")));
            }
        }

        events.extend(link.events.try_iter());

        if events.iter().any(|e| matches!(e, IngestEvent::Failed(_))) {
            self.disconnect();
        }

        events
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::PidGains;
    use crate::transport::mock::{MockHandle, MockTransport};
    use std::thread;

    fn mock_opener() -> (
        impl FnOnce() -> Result<Box<dyn Transport>, Box<dyn Error>>,
        MockHandle,
    ) {
        let (port, handle) = MockTransport::new();
        let opener = move || -> Result<Box<dyn Transport>, Box<dyn Error>> { Ok(Box::new(port)) };
        (opener, handle)
    }

    fn values(s: &Session) -> Vec<f64> {
        s.snapshot().iter().map(|x| x.value).collect()
    }

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
    fn failed_open_stays_disconnected() {
        let mut s = Session::new(10, IngestMode::Polled);
        let res = s.connect_with(|| Err("port busy".into()), None);
        assert!(res.is_err());
        assert_eq!(s.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_then_send_writes_wire_form() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();
        assert_eq!(s.state(), ConnectionState::Connected);

        s.send(&Command::new(45.0, None), LineEnding::Newline).unwrap();
        s.send(&Command::new(45.0, Some(PidGains::default())), LineEnding::Newline)
            .unwrap();
        assert_eq!(handle.written(), "45\n45,0.6,0.003,0.8\n");
    }

    #[test]
    fn send_without_connection_is_an_error() {
        let mut s = Session::new(10, IngestMode::Polled);
        assert!(s.send(&Command::new(1.0, None), LineEnding::Newline).is_err());
    }

    const DEFAULT_GAINS: [&str; 3] = ["0.6", "0.003", "0.8"];

    #[test]
    fn out_of_range_input_writes_nothing() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        let cases = [
            ("-5", AnglePolicy::NonNegative),
            ("400", AnglePolicy::FullTurn),
            ("-5", AnglePolicy::FullTurn),
            ("abc", AnglePolicy::NonNegative),
        ];
        for (angle, policy) in cases {
            let res = s.send_input(angle, DEFAULT_GAINS, policy, LoopMode::Open, LineEnding::Newline);
            assert!(matches!(res, Err(SendError::Invalid(_))), "{angle:?} under {policy:?}");
        }
        assert_eq!(handle.written(), "");
        assert!(s.is_connected());
    }

    #[test]
    fn bad_gain_text_in_closed_loop_writes_nothing() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        let res = s.send_input(
            "45",
            ["0.6", "fast", "0.8"],
            AnglePolicy::FullTurn,
            LoopMode::Closed,
            LineEnding::Newline,
        );
        assert!(matches!(
            res,
            Err(SendError::Invalid(CommandError::BadGain { name: "Ki", .. }))
        ));
        assert_eq!(handle.written(), "");
    }

    #[test]
    fn valid_input_writes_open_and_closed_loop_forms() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        let open = s
            .send_input("45", DEFAULT_GAINS, AnglePolicy::FullTurn, LoopMode::Open, LineEnding::Newline)
            .unwrap();
        assert_eq!(open, Command::new(45.0, None));

        let closed = s
            .send_input("45", DEFAULT_GAINS, AnglePolicy::NonNegative, LoopMode::Closed, LineEnding::Newline)
            .unwrap();
        assert_eq!(closed.gains, Some(PidGains::default()));

        s.send_input("400", DEFAULT_GAINS, AnglePolicy::NonNegative, LoopMode::Open, LineEnding::Bare)
            .unwrap();
        assert_eq!(handle.written(), "45\n45,0.6,0.003,0.8\n400");
    }

    #[test]
    fn input_is_validated_before_the_connection_check() {
        let mut s = Session::new(10, IngestMode::Polled);
        let res = s.send_input("400", DEFAULT_GAINS, AnglePolicy::FullTurn, LoopMode::Open, LineEnding::Newline);
        assert!(matches!(res, Err(SendError::Invalid(_))));
        let res = s.send_input("40", DEFAULT_GAINS, AnglePolicy::FullTurn, LoopMode::Open, LineEnding::Newline);
        assert!(matches!(res, Err(SendError::NotConnected)));
    }

    #[test]
    fn write_failure_keeps_connection() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        handle.wire().fail_writes = true;
        assert!(matches!(
            s.send(&Command::new(10.0, None), LineEnding::Bare),
            Err(SendError::Write(_))
        ));
        assert!(s.is_connected());
    }

    #[test]
    fn second_connect_is_refused() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, _h1) = mock_opener();
        s.connect_with(opener, None).unwrap();
        let (opener, h2) = mock_opener();
        assert!(s.connect_with(opener, None).is_err());
        assert!(s.is_connected());
        s.send(&Command::new(7.0, None), LineEnding::Newline).unwrap();
        assert_eq!(h2.written(), "");
    }

    #[test]
    fn polled_tick_ingests() {
        let mut s = Session::new(3, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        handle.feed(b"1\n2\nabc\n3\n4\n");
        let events = s.tick();
        assert_eq!(values(&s), vec![2.0, 3.0, 4.0]);
        assert!(matches!(events.as_slice(), [IngestEvent::Rejected { .. }]));
    }

    #[test]
    fn background_reader_ingests() {
        let mut s = Session::new(10, IngestMode::Background);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        handle.feed(b"90\n91\n");
        assert!(wait_for(|| s.buffer().len() == 2));
        assert_eq!(values(&s), vec![90.0, 91.0]);
    }

    #[test]
    fn close_releases_port_once_and_stops_ingestion() {
        for mode in IngestMode::ALL {
            let mut s = Session::new(10, mode);
            let (opener, handle) = mock_opener();
            s.connect_with(opener, None).unwrap();

            handle.feed(b"1\n");
            s.tick();
            assert!(wait_for(|| s.buffer().len() == 1));

            s.disconnect();
            s.disconnect();
            assert_eq!(handle.closes(), 1);
            assert_eq!(s.state(), ConnectionState::Disconnected);

            handle.feed(b"2\n");
            thread::sleep(Duration::from_millis(30));
            assert!(s.tick().is_empty());
            assert_eq!(values(&s), vec![1.0]);

            drop(s);
            assert_eq!(handle.closes(), 1);
        }
    }

    #[test]
    fn dropping_a_connected_session_closes_the_port() {
        let (opener, handle) = mock_opener();
        {
            let mut s = Session::new(10, IngestMode::Background);
            s.connect_with(opener, None).unwrap();
        }
        assert_eq!(handle.closes(), 1);
    }

    #[test]
    fn read_failure_disconnects() {
        let mut s = Session::new(10, IngestMode::Background);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();

        handle.wire().fail_reads = true;
        let mut failed = false;
        for _ in 0..200 {
            if s.tick().iter().any(|e| matches!(e, IngestEvent::Failed(_))) {
                failed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(failed);
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert_eq!(handle.closes(), 1);
    }

    #[test]
    fn handshake_waits_for_its_delay() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        let hs = Handshake {
            payload: b"1\n".to_vec(),
            delay: Duration::from_millis(40),
        };
        s.connect_with(opener, Some(hs)).unwrap();

        s.tick();
        assert_eq!(handle.written(), "");

        thread::sleep(Duration::from_millis(60));
        s.tick();
        s.tick();
        assert_eq!(handle.written(), "1\n");
    }

    #[test]
    fn buffer_survives_reconnect() {
        let mut s = Session::new(10, IngestMode::Polled);
        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();
        handle.feed(b"5\n");
        s.tick();
        s.disconnect();

        let (opener, handle) = mock_opener();
        s.connect_with(opener, None).unwrap();
        handle.feed(b"6\n");
        s.tick();
        assert_eq!(values(&s), vec![5.0, 6.0]);
    }
}
