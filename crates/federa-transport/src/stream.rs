//! Connections over framed byte streams.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use federa_codec::CodecConfig;
use tracing::{debug, error, warn};

use crate::error::{Result, TransportError};
use crate::frame::{FrameConfig, FrameReader, FrameWriter};
use crate::message::Payload;
use crate::packet::PacketCoder;
use crate::traits::{Connection, ConnectionEvent};

type BoxedReader = Box<dyn Read + Send>;
type ShutdownHook = Box<dyn Fn() -> std::io::Result<()> + Send>;

enum Incoming {
    Frame(Bytes),
    Eof,
    Failed(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Open,
    Closed,
}

/// A connection over an already-established byte stream.
///
/// Opening starts a background thread that reads frames; decoding happens
/// on the caller's thread in [`poll_event`](Connection::poll_event). The
/// stream cannot be reopened once closed because the peer's dictionaries
/// cannot be reset in band.
pub struct StreamConnection<W: Write + Send> {
    writer: FrameWriter<W>,
    reader: Option<FrameReader<BoxedReader>>,
    incoming: Option<Receiver<Incoming>>,
    shutdown: Option<ShutdownHook>,
    state: State,
    coder: PacketCoder,
    queued: Vec<Payload>,
    events: VecDeque<ConnectionEvent>,
}

impl<W: Write + Send> StreamConnection<W> {
    pub fn new<R: Read + Send + 'static>(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, CodecConfig::default(), FrameConfig::default())
    }

    pub fn with_config<R: Read + Send + 'static>(
        reader: R,
        writer: W,
        codec: CodecConfig,
        frame: FrameConfig,
    ) -> Self {
        Self {
            writer: FrameWriter::with_config(writer, frame.clone()),
            reader: Some(FrameReader::with_config(Box::new(reader), frame)),
            incoming: None,
            shutdown: None,
            state: State::Idle,
            coder: PacketCoder::new(codec),
            queued: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Install a hook run on close and drop, used to unblock the reader thread.
    pub fn with_shutdown(mut self, hook: impl Fn() -> std::io::Result<()> + Send + 'static) -> Self {
        self.shutdown = Some(Box::new(hook));
        self
    }

    fn run_shutdown(&mut self) {
        if let Some(hook) = self.shutdown.take() {
            if let Err(err) = hook() {
                debug!(error = %err, "stream shutdown failed");
            }
        }
    }

    fn mark_closed(&mut self) -> bool {
        let was_open = self.state == State::Open;
        self.state = State::Closed;
        self.queued.clear();
        self.run_shutdown();
        was_open
    }

    fn transmit(&mut self, payload: &Payload) -> Result<()> {
        let bytes = self.coder.encode(payload)?;
        self.writer.write_frame(&bytes)
    }

    fn handle_incoming(&mut self, incoming: Incoming) -> Result<Option<ConnectionEvent>> {
        match incoming {
            Incoming::Frame(bytes) => {
                if self.state != State::Open {
                    return Ok(None);
                }
                match self.coder.decode(bytes) {
                    Ok(payload) => Ok(Some(ConnectionEvent::Packet(payload))),
                    Err(err) if err.is_fatal() => {
                        error!(error = %err, "packet stream desynchronised, closing");
                        if self.mark_closed() {
                            self.events.push_back(ConnectionEvent::Closed);
                        }
                        Err(err)
                    }
                    Err(err) => {
                        warn!(error = %err, "ignoring malformed packet");
                        Ok(None)
                    }
                }
            }
            Incoming::Eof => Ok(self.peer_gone()),
            Incoming::Failed(err) => {
                warn!(error = %err, "stream read failed");
                if self.mark_closed() {
                    self.events.push_back(ConnectionEvent::Closed);
                }
                Err(err)
            }
        }
    }

    fn peer_gone(&mut self) -> Option<ConnectionEvent> {
        if self.mark_closed() {
            debug!("stream peer closed");
            return Some(ConnectionEvent::Closed);
        }
        None
    }
}

impl StreamConnection<TcpStream> {
    /// Wrap a connected TCP stream.
    pub fn tcp(stream: TcpStream) -> Result<Self> {
        Self::tcp_with_config(stream, CodecConfig::default(), FrameConfig::default())
    }

    pub fn tcp_with_config(stream: TcpStream, codec: CodecConfig, frame: FrameConfig) -> Result<Self> {
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self::with_config(reader, stream, codec, frame)
            .with_shutdown(move || control.shutdown(Shutdown::Both)))
    }

    /// Connect to a TCP address.
    pub fn connect_tcp(
        addr: impl std::net::ToSocketAddrs,
        codec: CodecConfig,
        frame: FrameConfig,
    ) -> Result<Self> {
        Self::tcp_with_config(TcpStream::connect(addr)?, codec, frame)
    }
}

#[cfg(unix)]
impl StreamConnection<std::os::unix::net::UnixStream> {
    /// Wrap a connected Unix domain socket.
    pub fn unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        Self::unix_with_config(stream, CodecConfig::default(), FrameConfig::default())
    }

    pub fn unix_with_config(
        stream: std::os::unix::net::UnixStream,
        codec: CodecConfig,
        frame: FrameConfig,
    ) -> Result<Self> {
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self::with_config(reader, stream, codec, frame)
            .with_shutdown(move || control.shutdown(Shutdown::Both)))
    }

    /// Connect to a Unix domain socket path.
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::unix(std::os::unix::net::UnixStream::connect(path)?)
    }
}

impl<W: Write + Send> Connection for StreamConnection<W> {
    fn open(&mut self) -> Result<()> {
        match self.state {
            State::Open => {
                warn!("stream connection is already open");
                return Ok(());
            }
            State::Closed => return Err(TransportError::Closed),
            State::Idle => {}
        }
        let mut reader = self.reader.take().ok_or(TransportError::Closed)?;
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("federa-stream-reader".into())
            .spawn(move || loop {
                let incoming = match reader.read_frame() {
                    Ok(bytes) => Incoming::Frame(bytes),
                    Err(TransportError::Closed) => Incoming::Eof,
                    Err(err) => Incoming::Failed(err),
                };
                let done = !matches!(incoming, Incoming::Frame(_));
                if tx.send(incoming).is_err() || done {
                    break;
                }
            })?;

        self.incoming = Some(rx);
        self.state = State::Open;
        self.events.push_back(ConnectionEvent::Opened);
        for payload in std::mem::take(&mut self.queued) {
            self.transmit(&payload)?;
        }
        debug!("stream connection open");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.mark_closed() {
            self.events.push_back(ConnectionEvent::Closed);
        } else {
            warn!("stream connection is not open");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state == State::Open
    }

    fn send_packet(&mut self, payload: &Payload) -> Result<()> {
        match self.state {
            State::Open => self.transmit(payload),
            State::Idle => {
                self.queued.push(payload.clone());
                Ok(())
            }
            State::Closed => Err(TransportError::Closed),
        }
    }

    fn poll_event(&mut self) -> Result<Option<ConnectionEvent>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            let Some(rx) = self.incoming.as_ref() else {
                return Ok(None);
            };
            match rx.try_recv() {
                Ok(incoming) => {
                    if let Some(event) = self.handle_incoming(incoming)? {
                        return Ok(Some(event));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    self.incoming = None;
                    return Ok(self.peer_gone());
                }
            }
        }
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<Option<ConnectionEvent>> {
        if let Some(event) = self.poll_event()? {
            return Ok(Some(event));
        }
        let Some(rx) = self.incoming.as_ref() else {
            return Ok(None);
        };
        match rx.recv_timeout(timeout) {
            Ok(incoming) => match self.handle_incoming(incoming)? {
                Some(event) => Ok(Some(event)),
                None => self.poll_event(),
            },
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.incoming = None;
                Ok(self.peer_gone())
            }
        }
    }
}

impl<W: Write + Send> Drop for StreamConnection<W> {
    fn drop(&mut self) {
        self.run_shutdown();
    }
}

impl<W: Write + Send> std::fmt::Debug for StreamConnection<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("state", &self.state)
            .field("queued", &self.queued.len())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::message::ProcessType;

    fn hello(id: &str) -> Payload {
        Payload::Handshake {
            process_id: id.into(),
            process_type: ProcessType::Player,
        }
    }

    fn next(conn: &mut impl Connection) -> ConnectionEvent {
        conn.wait_event(Duration::from_secs(5))
            .unwrap()
            .expect("event before timeout")
    }

    #[test]
    fn exchanges_packets_over_a_socket_pair() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut a = StreamConnection::unix(left).unwrap();
        let mut b = StreamConnection::unix(right).unwrap();

        a.send_packet(&hello("queued")).unwrap();
        a.open().unwrap();
        b.open().unwrap();
        assert_eq!(next(&mut a), ConnectionEvent::Opened);
        assert_eq!(next(&mut b), ConnectionEvent::Opened);

        a.send_packet(&hello("a")).unwrap();
        b.send_packet(&Payload::Heartbeat).unwrap();

        assert_eq!(next(&mut b), ConnectionEvent::Packet(hello("queued")));
        assert_eq!(next(&mut b), ConnectionEvent::Packet(hello("a")));
        assert_eq!(next(&mut a), ConnectionEvent::Packet(Payload::Heartbeat));
    }

    #[test]
    fn peer_drop_is_reported_as_closed() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut a = StreamConnection::unix(left).unwrap();
        let mut b = StreamConnection::unix(right).unwrap();
        a.open().unwrap();
        b.open().unwrap();
        assert_eq!(next(&mut a), ConnectionEvent::Opened);

        drop(b);
        assert_eq!(next(&mut a), ConnectionEvent::Closed);
        assert!(!a.is_open());
        assert!(matches!(a.send_packet(&Payload::Heartbeat), Err(TransportError::Closed)));
    }

    #[test]
    fn cannot_reopen_after_close() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mut a = StreamConnection::unix(left).unwrap();
        a.open().unwrap();
        a.close().unwrap();
        assert_eq!(next(&mut a), ConnectionEvent::Opened);
        assert_eq!(next(&mut a), ConnectionEvent::Closed);
        assert!(matches!(a.open(), Err(TransportError::Closed)));
    }
}
