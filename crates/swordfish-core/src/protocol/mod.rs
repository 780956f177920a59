//! Protocol module containing the message catalog, the envelope codec and
//! the receive-side frame accumulator.

pub mod accumulator;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod sequence;

pub use accumulator::FrameAccumulator;
pub use envelope::{decode_envelope, Direction, Envelope};
pub use error::{DecodeError, ValidationError};
pub use messages::*;
pub use sequence::SequenceCounter;
