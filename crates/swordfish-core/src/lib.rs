//! # swordfish-core
//!
//! Shared protocol library for talking to a SwordFish microcontroller over a
//! serial line.  It contains the typed message catalog, the "concentrated"
//! envelope codec that frames every message on the wire, a stream accumulator
//! that reassembles envelopes from arbitrary read chunks, and a sequence
//! counter.
//!
//! This crate has zero dependencies on OS APIs or serial ports; the host
//! crate supplies the transport.
//!
//! # Architecture overview (for beginners)
//!
//! A serial port is just a pipe of bytes.  It has no notion of "messages", so
//! the protocol adds two layers on top of it:
//!
//! - **`protocol::messages`** – The catalog.  Each message (e.g. `Ping`,
//!   `VersionData`) knows how to turn its fields into a payload byte vector
//!   and back.
//!
//! - **`protocol::envelope`** – The frame.  A payload is wrapped together with
//!   a message id (so replies can be matched to requests), the message type,
//!   the payload length and a checksum.  The frame starts with a sync word so
//!   a receiver joining mid-stream can find the next frame boundary.
//!
//! - **`protocol::accumulator`** – Serial reads return whatever bytes happen
//!   to be available: half a frame, two frames, or line noise.  The
//!   accumulator buffers them until a complete frame is present.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `swordfish_core::Envelope` instead of `swordfish_core::protocol::envelope::Envelope`.
pub use protocol::accumulator::FrameAccumulator;
pub use protocol::envelope::{decode_envelope, Direction, Envelope};
pub use protocol::error::{DecodeError, ValidationError};
pub use protocol::messages::{
    CatalogMessage, MessageCategory, MessageType, Ping, SwordFishMessage, VersionData,
};
pub use protocol::sequence::SequenceCounter;
