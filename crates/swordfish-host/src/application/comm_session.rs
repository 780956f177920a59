//! Request/reply exchanges with a SwordFish device.
//!
//! A [`CommSession`] owns one open serial port.  Each call to
//! [`CommSession::send_and_receive`] performs one exchange:
//!
//! ```text
//! Open ──write request──▶ Sending ──tx+1──▶ AwaitingReply ──matching reply──▶ Open
//!                                                  │
//!                                                  └──timeout──▶ Open
//! ```
//!
//! `tx_counter` counts envelopes written and `rx_counter` counts envelopes
//! read, whatever became of the exchange they belonged to.
//!
//! A failed write or a fatal read error closes the session; every later call
//! returns [`CommError::SessionClosed`].
//!
//! # Matching replies (for beginners)
//!
//! The device echoes the message id of the request it answers.  The session
//! uses the low 16 bits of its transmit counter as the id, so while one
//! request is outstanding its id is unique.  Any frame with another id (a late
//! reply to an earlier, timed-out request or a message the device sent on
//! its own) is a *stray*: it is counted, logged, handed to the optional
//! unsolicited handler and otherwise ignored.
//!
//! A reply with the right id must also have the type the request's
//! [`MessageCategory`](swordfish_core::MessageCategory) promises: a bounce
//! or parameter message comes back as itself, an operation as its response.

use std::io;
use std::time::{Duration, Instant};

use swordfish_core::{
    CatalogMessage, DecodeError, Direction, Envelope, FrameAccumulator, MessageType,
    SequenceCounter, SwordFishMessage,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::transport::{PortError, SerialBackend, SerialSettings, SerialTransport};

/// Size of the scratch buffer handed to each transport read.
const READ_CHUNK: usize = 256;

/// Errors returned by [`CommSession`] operations.
#[derive(Debug, Error)]
pub enum CommError {
    /// No matching reply arrived in time.  The session stays open.
    #[error("no reply to message {message_id} within {timeout:?}")]
    Timeout { message_id: u16, timeout: Duration },

    /// The port could not be opened.
    #[error("serial port unavailable: {0}")]
    PortUnavailable(#[from] PortError),

    /// The session was closed, explicitly or after an I/O failure.
    #[error("session is closed")]
    SessionClosed,

    /// The port failed while reading or writing.  The session is now closed.
    #[error("serial I/O failure: {0}")]
    IoFailure(#[source] io::Error),

    /// A reply arrived with the wrong type, or its payload could not be
    /// decoded as expected.
    #[error("failed to decode reply: {0}")]
    Decode(#[from] DecodeError),
}

/// Timing and line settings of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Total time one exchange waits for its reply.
    pub reply_timeout: Duration,
    /// Longest single blocking read while waiting.
    pub poll_interval: Duration,
    pub serial: SerialSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            serial: SerialSettings::default(),
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Sending,
    AwaitingReply,
    Closed,
}

type UnsolicitedHandler = Box<dyn FnMut(&Envelope) + Send>;

/// An open connection to one SwordFish device.
pub struct CommSession {
    port_path: String,
    transport: Option<Box<dyn SerialTransport>>,
    config: SessionConfig,
    tx_counter: SequenceCounter,
    rx_counter: SequenceCounter,
    stray_counter: SequenceCounter,
    pending_request_id: Option<u16>,
    state: SessionState,
    accumulator: FrameAccumulator,
    unsolicited: Option<UnsolicitedHandler>,
}

impl CommSession {
    /// Opens `port_path` through `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::PortUnavailable`] if the port cannot be opened.
    pub fn open(
        backend: &dyn SerialBackend,
        port_path: &str,
        config: SessionConfig,
    ) -> Result<Self, CommError> {
        let transport = backend.open(port_path, &config.serial)?;
        info!(
            "opened session on {port_path} at {} baud",
            config.serial.baud_rate
        );
        Ok(Self::from_transport(port_path, transport, config))
    }

    /// Wraps a transport that is already open.
    pub fn from_transport(
        port_path: &str,
        transport: Box<dyn SerialTransport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            port_path: port_path.to_string(),
            transport: Some(transport),
            config,
            tx_counter: SequenceCounter::new(),
            rx_counter: SequenceCounter::new(),
            stray_counter: SequenceCounter::new(),
            pending_request_id: None,
            state: SessionState::Open,
            accumulator: FrameAccumulator::new(Direction::FromDevice),
            unsolicited: None,
        }
    }

    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Envelopes successfully written.
    pub fn tx_counter(&self) -> u64 {
        self.tx_counter.current()
    }

    /// Envelopes read from the port, replies and strays alike.
    pub fn rx_counter(&self) -> u64 {
        self.rx_counter.current()
    }

    /// Envelopes read that matched no outstanding request.
    pub fn stray_counter(&self) -> u64 {
        self.stray_counter.current()
    }

    /// Id of the request currently waiting for a reply, if any.
    pub fn pending_request_id(&self) -> Option<u16> {
        self.pending_request_id
    }

    /// Registers a callback for stray envelopes.  Replaces any earlier one.
    pub fn set_unsolicited_handler(&mut self, handler: impl FnMut(&Envelope) + Send + 'static) {
        self.unsolicited = Some(Box::new(handler));
    }

    /// Sends `message` and waits for the envelope that answers it.
    ///
    /// # Errors
    ///
    /// - [`CommError::SessionClosed`] if the session is closed.
    /// - [`CommError::IoFailure`] if the port fails; the session is closed.
    /// - [`CommError::Timeout`] if no matching reply arrives within
    ///   `reply_timeout`.  There is no automatic retry.
    /// - [`CommError::Decode`] if the reply carries a type other than the
    ///   one the request is answered with.
    pub fn send_and_receive(
        &mut self,
        message: impl Into<SwordFishMessage>,
    ) -> Result<Envelope, CommError> {
        let transport = self.transport.as_mut().ok_or(CommError::SessionClosed)?;

        let message_id = self.tx_counter.current_id();
        let request = Envelope::wrap(message_id, message);
        self.state = SessionState::Sending;
        if let Err(e) = transport.write_all(&request.to_bytes()) {
            error!("write to {} failed: {e}", self.port_path);
            self.close();
            return Err(CommError::IoFailure(e));
        }
        self.tx_counter.next();
        self.pending_request_id = Some(message_id);
        self.state = SessionState::AwaitingReply;
        debug!(message_id, "sent {}", request.message_type());

        let result = self.await_reply(message_id, request.message_type().reply_type());
        self.pending_request_id = None;
        if self.state == SessionState::AwaitingReply {
            self.state = SessionState::Open;
        }
        result
    }

    /// Sends `message` and decodes the reply as `T`.
    ///
    /// # Errors
    ///
    /// The errors of [`CommSession::send_and_receive`], plus
    /// [`CommError::Decode`] if the reply is not a well-formed `T`.
    pub fn request<T: CatalogMessage>(
        &mut self,
        message: impl Into<SwordFishMessage>,
    ) -> Result<T, CommError> {
        let reply = self.send_and_receive(message)?;
        Ok(reply.open::<T>()?)
    }

    /// Reads for up to `wait` and hands every envelope received to the
    /// unsolicited handler.  Returns how many arrived.
    ///
    /// # Errors
    ///
    /// [`CommError::SessionClosed`] or [`CommError::IoFailure`].
    pub fn poll_unsolicited(&mut self, wait: Duration) -> Result<usize, CommError> {
        if !self.is_open() {
            return Err(CommError::SessionClosed);
        }
        let deadline = Instant::now() + wait;
        let mut delivered = 0;
        loop {
            while let Some(envelope) = self.accumulator.next_envelope() {
                self.rx_counter.next();
                self.handle_stray(envelope, None);
                delivered += 1;
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(delivered);
            }
            self.read_slice((deadline - now).min(self.config.poll_interval))?;
        }
    }

    /// Releases the port.  Later operations fail with
    /// [`CommError::SessionClosed`].
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!(
                tx = self.tx_counter(),
                rx = self.rx_counter(),
                "closed session on {}",
                self.port_path
            );
        }
        self.state = SessionState::Closed;
        self.pending_request_id = None;
        self.accumulator.clear();
    }

    fn await_reply(
        &mut self,
        message_id: u16,
        reply_type: Option<MessageType>,
    ) -> Result<Envelope, CommError> {
        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            while let Some(envelope) = self.accumulator.next_envelope() {
                self.rx_counter.next();
                if envelope.message_id() == message_id {
                    debug!(message_id, "received {}", envelope.message_type());
                    return match reply_type {
                        Some(expected) if expected != envelope.message_type() => {
                            warn!(
                                message_id,
                                "reply is {}, expected {expected}",
                                envelope.message_type()
                            );
                            Err(CommError::Decode(DecodeError::TypeMismatch {
                                expected,
                                actual: envelope.message_type(),
                            }))
                        }
                        _ => Ok(envelope),
                    };
                }
                self.handle_stray(envelope, Some(message_id));
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    message_id,
                    "no reply from {} within {:?}", self.port_path, self.config.reply_timeout
                );
                return Err(CommError::Timeout {
                    message_id,
                    timeout: self.config.reply_timeout,
                });
            }
            self.read_slice((deadline - now).min(self.config.poll_interval))?;
        }
    }

    // One bounded read into the accumulator.  A read error closes the session.
    fn read_slice(&mut self, timeout: Duration) -> Result<(), CommError> {
        let transport = self.transport.as_mut().ok_or(CommError::SessionClosed)?;
        let mut buf = [0u8; READ_CHUNK];
        match transport.read(&mut buf, timeout) {
            Ok(0) => Ok(()),
            Ok(n) => {
                self.accumulator.push(&buf[..n]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => {
                error!("read from {} failed: {e}", self.port_path);
                self.close();
                Err(CommError::IoFailure(e))
            }
        }
    }

    fn handle_stray(&mut self, envelope: Envelope, expected: Option<u16>) {
        self.stray_counter.next();
        debug!(
            message_id = envelope.message_id(),
            ?expected,
            "stray {}",
            envelope.message_type()
        );
        if let Some(handler) = self.unsolicited.as_mut() {
            handler(&envelope);
        }
    }
}

impl Drop for CommSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
