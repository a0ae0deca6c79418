use std::time::Duration;

use crate::error::Result;
use crate::message::Payload;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Both ends are ready; packets now flow.
    Opened,
    /// The connection was closed locally, by the peer, or after a fatal error.
    Closed,
    /// A packet arrived.
    Packet(Payload),
}

/// An ordered, at-most-once packet connection to a peer.
///
/// Connections are polled rather than calling back, so the owner decides
/// when incoming packets are applied. Each implementation owns the
/// compression state for both directions and resets it on every open.
pub trait Connection: Send {
    /// Start opening. [`ConnectionEvent::Opened`] follows once the peer is ready.
    fn open(&mut self) -> Result<()>;

    /// Close the connection. A [`ConnectionEvent::Closed`] follows.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Send a packet. Packets sent before the connection is open are queued.
    fn send_packet(&mut self, payload: &Payload) -> Result<()>;

    /// Return the next ready event without blocking.
    ///
    /// A fatal decode error resets the connection: the error is returned and
    /// a `Closed` event is reported on the next call.
    fn poll_event(&mut self) -> Result<Option<ConnectionEvent>>;

    /// Wait up to `timeout` for the next event.
    fn wait_event(&mut self, timeout: Duration) -> Result<Option<ConnectionEvent>> {
        let _ = timeout;
        self.poll_event()
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send_packet(&mut self, payload: &Payload) -> Result<()> {
        (**self).send_packet(payload)
    }

    fn poll_event(&mut self) -> Result<Option<ConnectionEvent>> {
        (**self).poll_event()
    }

    fn wait_event(&mut self, timeout: Duration) -> Result<Option<ConnectionEvent>> {
        (**self).wait_event(timeout)
    }
}
