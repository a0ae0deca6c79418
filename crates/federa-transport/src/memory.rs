//! In-process connection pairs.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use bytes::Bytes;
use federa_codec::CodecConfig;
use tracing::{debug, error, trace, warn};

use crate::error::{Result, TransportError};
use crate::message::Payload;
use crate::packet::PacketCoder;
use crate::traits::{Connection, ConnectionEvent};

/// What travels between the two ends of a pair.
#[derive(Debug)]
enum Signal {
    Open,
    Close,
    Packet(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Opening,
    Open,
}

/// One end of an in-process connection.
///
/// Packets are compressed exactly as on a network stream, so the pair
/// exercises the full codec. Either end closing closes both; each end must
/// call [`open`](Connection::open) again to resume, which restarts the
/// dictionaries on both sides.
#[derive(Debug)]
pub struct MemoryConnection {
    name: String,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    state: State,
    peer_open: bool,
    config: CodecConfig,
    coder: PacketCoder,
    queued: Vec<Payload>,
    events: VecDeque<ConnectionEvent>,
}

impl MemoryConnection {
    /// Create a connected pair with default codec settings.
    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> (Self, Self) {
        Self::pair_with_config(a, b, CodecConfig::default())
    }

    pub fn pair_with_config(
        a: impl Into<String>,
        b: impl Into<String>,
        config: CodecConfig,
    ) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            Self::new(a.into(), a_tx, a_rx, config.clone()),
            Self::new(b.into(), b_tx, b_rx, config),
        )
    }

    fn new(name: String, tx: Sender<Signal>, rx: Receiver<Signal>, config: CodecConfig) -> Self {
        Self {
            name,
            tx,
            rx,
            state: State::Closed,
            peer_open: false,
            coder: PacketCoder::new(config.clone()),
            config,
            queued: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send raw bytes as a packet, bypassing the compressor.
    ///
    /// Used to exercise the receiving side's handling of corrupt input.
    pub fn send_raw(&mut self, bytes: Bytes) -> Result<()> {
        self.signal(Signal::Packet(bytes))
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        self.tx.send(signal).map_err(|_| TransportError::Closed)
    }

    fn transmit(&mut self, payload: &Payload) -> Result<()> {
        let bytes = self.coder.encode(payload)?;
        self.signal(Signal::Packet(bytes))
    }

    fn become_open(&mut self) -> Result<()> {
        self.state = State::Open;
        debug!(connection = %self.name, queued = self.queued.len(), "memory connection open");
        for payload in std::mem::take(&mut self.queued) {
            self.transmit(&payload)?;
        }
        Ok(())
    }

    fn mark_closed(&mut self) -> bool {
        let was_closed = self.state == State::Closed;
        self.state = State::Closed;
        self.peer_open = false;
        self.queued.clear();
        !was_closed
    }

    fn handle_signal(&mut self, signal: Signal) -> Result<Option<ConnectionEvent>> {
        match signal {
            Signal::Open => {
                self.peer_open = true;
                if self.state == State::Opening {
                    self.become_open()?;
                    return Ok(Some(ConnectionEvent::Opened));
                }
                Ok(None)
            }
            Signal::Close => {
                if self.mark_closed() {
                    debug!(connection = %self.name, "peer closed memory connection");
                    return Ok(Some(ConnectionEvent::Closed));
                }
                Ok(None)
            }
            Signal::Packet(bytes) => {
                if self.state != State::Open {
                    trace!(connection = %self.name, "dropping packet received while not open");
                    return Ok(None);
                }
                match self.coder.decode(bytes) {
                    Ok(payload) => Ok(Some(ConnectionEvent::Packet(payload))),
                    Err(err) if err.is_fatal() => {
                        error!(connection = %self.name, error = %err, "packet stream desynchronised, resetting");
                        let _ = self.signal(Signal::Close);
                        self.mark_closed();
                        self.events.push_back(ConnectionEvent::Closed);
                        Err(err)
                    }
                    Err(err) => {
                        warn!(connection = %self.name, error = %err, "ignoring malformed packet");
                        Ok(None)
                    }
                }
            }
        }
    }

    fn disconnected(&mut self) -> Option<ConnectionEvent> {
        if self.mark_closed() {
            debug!(connection = %self.name, "memory connection peer dropped");
            return Some(ConnectionEvent::Closed);
        }
        None
    }
}

impl Connection for MemoryConnection {
    fn open(&mut self) -> Result<()> {
        if self.state != State::Closed {
            warn!(connection = %self.name, "memory connection is already open");
            return Ok(());
        }
        self.coder = PacketCoder::new(self.config.clone());
        self.state = State::Opening;
        self.signal(Signal::Open)?;
        if self.peer_open {
            self.become_open()?;
            self.events.push_back(ConnectionEvent::Opened);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            warn!(connection = %self.name, "memory connection is not open");
            return Ok(());
        }
        let _ = self.signal(Signal::Close);
        self.mark_closed();
        self.events.push_back(ConnectionEvent::Closed);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state == State::Open
    }

    fn send_packet(&mut self, payload: &Payload) -> Result<()> {
        match self.state {
            State::Open => self.transmit(payload),
            State::Opening | State::Closed => {
                trace!(connection = %self.name, packet = ?payload.packet_type(), "queueing packet until open");
                self.queued.push(payload.clone());
                Ok(())
            }
        }
    }

    fn poll_event(&mut self) -> Result<Option<ConnectionEvent>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            match self.rx.try_recv() {
                Ok(signal) => {
                    if let Some(event) = self.handle_signal(signal)? {
                        return Ok(Some(event));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Ok(self.disconnected()),
            }
        }
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<Option<ConnectionEvent>> {
        if let Some(event) = self.poll_event()? {
            return Ok(Some(event));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(signal) => match self.handle_signal(signal)? {
                Some(event) => Ok(Some(event)),
                None => self.poll_event(),
            },
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(self.disconnected()),
        }
    }
}
