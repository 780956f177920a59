//! Reassembles envelopes from an unframed byte stream.
//!
//! # Why is this needed? (for beginners)
//!
//! A serial read returns whatever bytes the driver has buffered at that
//! moment.  One read can deliver half a frame, the next the other half plus
//! the start of another frame.  Line noise or a device reset can also inject
//! bytes that belong to no frame at all.
//!
//! The accumulator keeps everything that has not yet formed a complete frame
//! and hands out envelopes as soon as they are whole:
//!
//! 1. Bytes before the next sync word are garbage and are dropped.
//! 2. A frame that starts with a sync word but is not complete yet stays
//!    buffered until more bytes arrive.
//! 3. A frame that is complete but corrupt (checksum, unknown type,
//!    impossible length) is skipped one byte at a time, so a real frame
//!    hidden behind a false sync word is still found.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::protocol::envelope::{decode_envelope, Direction, Envelope, MAX_FRAME_SIZE, SYNC_SIZE};
use crate::protocol::error::DecodeError;

/// Upper bound on buffered bytes: three maximum-size frames.
pub const ACCUMULATOR_CAPACITY: usize = 3 * MAX_FRAME_SIZE;

/// Stream buffer that yields complete envelopes of one direction.
#[derive(Debug)]
pub struct FrameAccumulator {
    direction: Direction,
    buffer: BytesMut,
    corrupt_frames: u64,
    discarded_bytes: u64,
}

impl FrameAccumulator {
    /// Creates an accumulator that only accepts frames travelling in
    /// `direction`.  Frames of the other direction are treated as garbage.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            buffer: BytesMut::with_capacity(ACCUMULATOR_CAPACITY),
            corrupt_frames: 0,
            discarded_bytes: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Appends freshly read bytes.
    ///
    /// If the buffer would grow beyond [`ACCUMULATOR_CAPACITY`] the oldest
    /// bytes are dropped.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > ACCUMULATOR_CAPACITY {
            let excess = self.buffer.len() - ACCUMULATOR_CAPACITY;
            self.buffer.advance(excess);
            self.discarded_bytes += excess as u64;
            warn!(dropped = excess, "frame buffer full, dropping oldest bytes");
        }
    }

    /// Returns the next complete envelope, or `None` if more bytes are needed.
    pub fn next_envelope(&mut self) -> Option<Envelope> {
        let sync = self.direction.sync_word();
        loop {
            let Some(start) = self.buffer.windows(SYNC_SIZE).position(|w| w == sync) else {
                self.drop_garbage_keeping_sync_prefix();
                return None;
            };
            if start > 0 {
                debug!(skipped = start, "skipping bytes before sync word");
                self.buffer.advance(start);
                self.discarded_bytes += start as u64;
            }

            match decode_envelope(&self.buffer) {
                Ok((envelope, consumed)) => {
                    self.buffer.advance(consumed);
                    return Some(envelope);
                }
                Err(DecodeError::Truncated { .. }) => return None,
                Err(e) => {
                    warn!(error = %e, "skipping corrupt frame");
                    self.corrupt_frames += 1;
                    self.discarded_bytes += 1;
                    self.buffer.advance(1);
                }
            }
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames that started with a sync word but failed to decode.
    pub fn corrupt_frames(&self) -> u64 {
        self.corrupt_frames
    }

    /// Bytes thrown away as garbage, corrupt frames or overflow.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Forgets every buffered byte.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    // No sync word in the buffer: only its last SYNC_SIZE - 1 bytes can still
    // become the start of one.
    fn drop_garbage_keeping_sync_prefix(&mut self) {
        let keep = SYNC_SIZE - 1;
        if self.buffer.len() > keep {
            let drop = self.buffer.len() - keep;
            debug!(skipped = drop, "no sync word in buffered bytes");
            self.buffer.advance(drop);
            self.discarded_bytes += drop as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::envelope::checksum;
    use crate::protocol::messages::{Ping, VersionData};

    fn device_frame(id: u16) -> Envelope {
        let request = Envelope::wrap(id, VersionData::empty());
        Envelope::reply_to(&request, VersionData::new(4, 500, [7; 8]))
    }

    #[test]
    fn test_complete_frame_is_returned_and_buffer_emptied() {
        // Arrange
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let frame = device_frame(1);

        // Act
        acc.push(&frame.to_bytes());
        let got = acc.next_envelope();

        // Assert
        assert_eq!(got, Some(frame));
        assert_eq!(acc.buffered_len(), 0);
        assert_eq!(acc.next_envelope(), None);
    }

    #[test]
    fn test_frame_delivered_one_byte_at_a_time() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let frame = device_frame(2);
        let bytes = frame.to_bytes();

        for (i, b) in bytes.iter().enumerate() {
            acc.push(&[*b]);
            let got = acc.next_envelope();
            if i + 1 < bytes.len() {
                assert_eq!(got, None, "frame must not appear after {} bytes", i + 1);
            } else {
                assert_eq!(got, Some(frame.clone()));
            }
        }
    }

    #[test]
    fn test_garbage_before_sync_is_skipped() {
        // Arrange
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let frame = device_frame(3);
        let mut bytes = vec![0x00, 0x13, 0xDE, 0xAD, 0x42];
        bytes.extend_from_slice(&frame.to_bytes());

        // Act
        acc.push(&bytes);

        // Assert
        assert_eq!(acc.next_envelope(), Some(frame));
        assert_eq!(acc.discarded_bytes(), 5);
    }

    #[test]
    fn test_two_frames_in_one_push() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let a = device_frame(10);
        let b = device_frame(11);
        let mut bytes = a.to_bytes();
        bytes.extend_from_slice(&b.to_bytes());

        acc.push(&bytes);

        assert_eq!(acc.next_envelope(), Some(a));
        assert_eq!(acc.next_envelope(), Some(b));
        assert_eq!(acc.next_envelope(), None);
    }

    #[test]
    fn test_corrupt_frame_is_skipped_and_next_frame_found() {
        // Arrange – flip a payload bit in the first frame
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let mut corrupt = device_frame(20).to_bytes();
        corrupt[10] ^= 0x01;
        let good = device_frame(21);
        corrupt.extend_from_slice(&good.to_bytes());

        // Act
        acc.push(&corrupt);

        // Assert
        assert_eq!(acc.next_envelope(), Some(good));
        assert_eq!(acc.corrupt_frames(), 1);
    }

    #[test]
    fn test_unknown_type_frame_is_skipped() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let mut bad = device_frame(30).to_bytes();
        bad[6] = 0x55;
        let last = bad.len() - 1;
        bad[last] = checksum(&bad[..last]);

        acc.push(&bad);

        assert_eq!(acc.next_envelope(), None);
        assert_eq!(acc.corrupt_frames(), 1);
    }

    #[test]
    fn test_frames_of_the_other_direction_are_ignored() {
        // Arrange – a local echo of the host's own request, then the reply
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let echo = Envelope::wrap(40, Ping);
        let reply = Envelope::reply_to(&echo, Ping);
        let mut bytes = echo.to_bytes();
        bytes.extend_from_slice(&reply.to_bytes());

        // Act
        acc.push(&bytes);

        // Assert
        assert_eq!(acc.next_envelope(), Some(reply));
        assert_eq!(acc.next_envelope(), None);
    }

    #[test]
    fn test_partial_sync_word_is_kept() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let frame = device_frame(50);
        let bytes = frame.to_bytes();

        acc.push(&[0x01, 0x02, 0x03, 0x04, bytes[0], bytes[1]]);
        assert_eq!(acc.next_envelope(), None);
        assert!(acc.buffered_len() <= SYNC_SIZE - 1);

        acc.push(&bytes[2..]);
        assert_eq!(acc.next_envelope(), Some(frame));
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);

        acc.push(&[0xAB; 4 * MAX_FRAME_SIZE]);

        assert!(acc.buffered_len() <= ACCUMULATOR_CAPACITY);
        assert_eq!(acc.next_envelope(), None);
        assert!(acc.buffered_len() < SYNC_SIZE);
    }

    #[test]
    fn test_clear_forgets_partial_frame() {
        let mut acc = FrameAccumulator::new(Direction::FromDevice);
        let bytes = device_frame(60).to_bytes();
        acc.push(&bytes[..8]);
        assert_eq!(acc.next_envelope(), None);

        acc.clear();

        assert_eq!(acc.buffered_len(), 0);
    }
}
