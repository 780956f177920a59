//! The "concentrated" envelope: the single frame format every SwordFish
//! message travels in.
//!
//! Wire format:
//! ```text
//! [sync:4][msg_id:2][msg_type:1][pay_len:2][payload:N][csum:1]
//! ```
//! Header size: 9 bytes, maximum frame size: 255 bytes. All multi-byte
//! integers are big-endian.
//!
//! The sync word differs per direction, so a receiver can tell a frame the
//! device sent from a local echo of its own output.  The checksum is the
//! wrapping 8-bit sum of every byte that precedes it.

use crate::protocol::error::{DecodeError, ValidationError};
use crate::protocol::messages::{CatalogMessage, MessageType, SwordFishMessage};

// ── Frame constants ───────────────────────────────────────────────────────────

/// Sync word opening every frame the host sends.
pub const SYNC_WORD_TO_DEVICE: [u8; 4] = [0xEF, 0xBE, 0xAD, 0xDE];

/// Sync word opening every frame the device sends.
pub const SYNC_WORD_FROM_DEVICE: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

pub const SYNC_SIZE: usize = 4;

/// Sync word, message id, message type and payload length.
pub const HEADER_SIZE: usize = 9;

pub const CHECKSUM_SIZE: usize = 1;

/// Largest frame the firmware accepts.
pub const MAX_FRAME_SIZE: usize = 255;

/// Largest payload that fits into a single frame (245 bytes).
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE - CHECKSUM_SIZE;

/// Smallest possible frame: a header, an empty payload and the checksum.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

// ── Direction ─────────────────────────────────────────────────────────────────

/// Which side of the link produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host → device.
    ToDevice,
    /// Device → host.
    FromDevice,
}

impl Direction {
    pub fn sync_word(self) -> [u8; 4] {
        match self {
            Direction::ToDevice => SYNC_WORD_TO_DEVICE,
            Direction::FromDevice => SYNC_WORD_FROM_DEVICE,
        }
    }

    /// The direction a reply to a frame of this direction travels in.
    pub fn reverse(self) -> Self {
        match self {
            Direction::ToDevice => Direction::FromDevice,
            Direction::FromDevice => Direction::ToDevice,
        }
    }

    fn from_sync_word(word: &[u8]) -> Option<Self> {
        if word == SYNC_WORD_TO_DEVICE {
            Some(Direction::ToDevice)
        } else if word == SYNC_WORD_FROM_DEVICE {
            Some(Direction::FromDevice)
        } else {
            None
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One framed message: identifier, type and encoded payload.
///
/// The payload is kept in its encoded form.  Whether it matches what the
/// message type requires is only checked when it is opened with
/// [`Envelope::message`] or [`Envelope::open`], so any well-formed frame
/// survives a decode/encode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    direction: Direction,
    message_id: u16,
    message_type: MessageType,
    payload: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope from raw parts.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PayloadTooLarge`] if `payload` does not fit
    /// into a single frame.
    pub fn new(
        direction: Direction,
        message_id: u16,
        message_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<Self, ValidationError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ValidationError::PayloadTooLarge {
                actual: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            direction,
            message_id,
            message_type,
            payload,
        })
    }

    /// Wraps a catalog message into a host → device envelope.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swordfish_core::{Direction, Envelope, Ping};
    ///
    /// let env = Envelope::wrap(7, Ping);
    /// assert_eq!(env.direction(), Direction::ToDevice);
    /// assert_eq!(Envelope::from_bytes(&env.to_bytes()), Ok(env));
    /// ```
    pub fn wrap(message_id: u16, message: impl Into<SwordFishMessage>) -> Self {
        Self::framed(Direction::ToDevice, message_id, message.into())
    }

    /// Builds the answer to `request`: opposite direction, same message id.
    pub fn reply_to(request: &Envelope, message: impl Into<SwordFishMessage>) -> Self {
        Self::framed(
            request.direction.reverse(),
            request.message_id,
            message.into(),
        )
    }

    // Catalog payloads are a few bytes long and always fit into a frame.
    fn framed(direction: Direction, message_id: u16, message: SwordFishMessage) -> Self {
        Self {
            direction,
            message_id,
            message_type: message.message_type(),
            payload: message.encode(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total size of the serialized frame.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }

    /// Serializes the envelope into its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.frame_len());
        buf.extend_from_slice(&self.direction.sync_word());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.push(self.message_type as u8);
        // Payload length is bounded by MAX_PAYLOAD_SIZE, well inside u16.
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf.push(checksum(&buf));
        buf
    }

    /// Parses exactly one frame.
    ///
    /// # Errors
    ///
    /// Fails with [`DecodeError::TrailingBytes`] if `bytes` holds more than
    /// one frame, and with the errors of [`decode_envelope`] otherwise.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (envelope, consumed) = decode_envelope(bytes)?;
        if consumed != bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - consumed));
        }
        Ok(envelope)
    }

    /// Decodes the payload into the catalog message named by the type byte.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::LengthMismatch`] if the payload does not have
    /// the size that message requires.
    pub fn message(&self) -> Result<SwordFishMessage, DecodeError> {
        SwordFishMessage::decode(self.message_type, &self.payload)
    }

    /// Decodes the payload as a specific catalog message.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TypeMismatch`] if the envelope carries another
    /// message type, or the decode error of `T`.
    pub fn open<T: CatalogMessage>(&self) -> Result<T, DecodeError> {
        if self.message_type != T::MESSAGE_TYPE {
            return Err(DecodeError::TypeMismatch {
                expected: T::MESSAGE_TYPE,
                actual: self.message_type,
            });
        }
        T::decode(&self.payload)
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes the first frame at the start of `bytes`.
///
/// Returns the envelope and the number of bytes it occupied, so a stream
/// reader can advance past it.
///
/// # Errors
///
/// - [`DecodeError::BadSync`] if `bytes` does not start with a sync word.
/// - [`DecodeError::Truncated`] if `bytes` is a strict prefix of a frame.
/// - [`DecodeError::PayloadTooLarge`] if the declared length is impossible.
/// - [`DecodeError::UnknownType`] if the type byte is not in the catalog.
/// - [`DecodeError::ChecksumMismatch`] if the frame is corrupt.
pub fn decode_envelope(bytes: &[u8]) -> Result<(Envelope, usize), DecodeError> {
    let sync_len = bytes.len().min(SYNC_SIZE);
    let sync = &bytes[..sync_len];
    if !SYNC_WORD_TO_DEVICE.starts_with(sync) && !SYNC_WORD_FROM_DEVICE.starts_with(sync) {
        return Err(DecodeError::BadSync(sync.to_vec()));
    }

    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated {
            needed: MIN_FRAME_SIZE,
            available: bytes.len(),
        });
    }

    let direction = Direction::from_sync_word(&bytes[..SYNC_SIZE])
        .ok_or_else(|| DecodeError::BadSync(bytes[..SYNC_SIZE].to_vec()))?;
    let message_id = u16::from_be_bytes([bytes[4], bytes[5]]);
    let type_byte = bytes[6];
    let payload_len = u16::from_be_bytes([bytes[7], bytes[8]]) as usize;

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(DecodeError::PayloadTooLarge {
            declared: payload_len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let message_type =
        MessageType::try_from(type_byte).map_err(|_| DecodeError::UnknownType(type_byte))?;

    let frame_len = HEADER_SIZE + payload_len + CHECKSUM_SIZE;
    if bytes.len() < frame_len {
        return Err(DecodeError::Truncated {
            needed: frame_len,
            available: bytes.len(),
        });
    }

    let received = bytes[frame_len - 1];
    let computed = checksum(&bytes[..frame_len - 1]);
    if received != computed {
        return Err(DecodeError::ChecksumMismatch { received, computed });
    }

    let envelope = Envelope {
        direction,
        message_id,
        message_type,
        payload: bytes[HEADER_SIZE..frame_len - 1].to_vec(),
    };
    Ok((envelope, frame_len))
}

/// Wrapping 8-bit sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{Ping, VersionData};

    fn version_reply() -> Envelope {
        let request = Envelope::wrap(3, VersionData::empty());
        Envelope::reply_to(&request, VersionData::new(1, 2, [1, 2, 3, 4, 5, 6, 7, 8]))
    }

    #[test]
    fn test_ping_frame_has_documented_layout() {
        // Arrange
        let env = Envelope::wrap(5, Ping);

        // Act
        let bytes = env.to_bytes();

        // Assert
        assert_eq!(
            bytes,
            vec![0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x05, 0x00, 0x00, 0x00, 0x3D]
        );
    }

    #[test]
    fn test_reply_uses_device_sync_word_and_echoes_id() {
        let reply = version_reply();
        let bytes = reply.to_bytes();

        assert_eq!(reply.direction(), Direction::FromDevice);
        assert_eq!(reply.message_id(), 3);
        assert_eq!(&bytes[..4], &SYNC_WORD_FROM_DEVICE);
        assert_eq!(bytes.len(), HEADER_SIZE + 11 + CHECKSUM_SIZE);
    }

    #[test]
    fn test_arbitrary_parts_round_trip() {
        // Payload validity is not checked at the envelope level, so a
        // VersionData frame with a 3-byte payload must survive as well.
        let ids = [0u16, 1, 0x00FF, 0xFF00, u16::MAX];
        let types = [MessageType::Ping, MessageType::VersionData];
        let lens = [0usize, 1, 3, 11, MAX_PAYLOAD_SIZE];
        for direction in [Direction::ToDevice, Direction::FromDevice] {
            for id in ids {
                for message_type in types {
                    for len in lens {
                        let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
                        let env = Envelope::new(direction, id, message_type, payload)
                            .expect("payload within limit");
                        let decoded = Envelope::from_bytes(&env.to_bytes()).expect("decode");
                        assert_eq!(decoded, env);
                    }
                }
            }
        }
    }

    #[test]
    fn test_new_rejects_oversize_payload() {
        let result = Envelope::new(
            Direction::ToDevice,
            0,
            MessageType::Ping,
            vec![0; MAX_PAYLOAD_SIZE + 1],
        );
        assert_eq!(
            result,
            Err(ValidationError::PayloadTooLarge {
                actual: 246,
                max: 245
            })
        );
    }

    #[test]
    fn test_every_strict_prefix_is_truncated() {
        let bytes = version_reply().to_bytes();
        for cut in 0..bytes.len() {
            let result = Envelope::from_bytes(&bytes[..cut]);
            assert!(
                matches!(result, Err(DecodeError::Truncated { .. })),
                "prefix of {cut} bytes gave {result:?}"
            );
        }
    }

    #[test]
    fn test_truncated_reports_full_frame_size_once_header_is_known() {
        let bytes = version_reply().to_bytes();
        let result = decode_envelope(&bytes[..12]);
        assert_eq!(
            result,
            Err(DecodeError::Truncated {
                needed: 21,
                available: 12
            })
        );
    }

    #[test]
    fn test_bad_sync_is_rejected() {
        let mut bytes = Envelope::wrap(1, Ping).to_bytes();
        bytes[0] = 0x00;
        assert!(matches!(
            Envelope::from_bytes(&bytes),
            Err(DecodeError::BadSync(_))
        ));
        assert!(matches!(
            decode_envelope(&[0x12]),
            Err(DecodeError::BadSync(_))
        ));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        // Arrange – patch the type byte and fix up the checksum
        let mut bytes = Envelope::wrap(1, Ping).to_bytes();
        bytes[6] = 0x7F;
        let last = bytes.len() - 1;
        bytes[last] = checksum(&bytes[..last]);

        // Act
        let result = Envelope::from_bytes(&bytes);

        // Assert
        assert_eq!(result, Err(DecodeError::UnknownType(0x7F)));
    }

    #[test]
    fn test_oversize_declared_length_is_rejected() {
        let mut bytes = Envelope::wrap(1, Ping).to_bytes();
        bytes[7] = 0x01;
        bytes[8] = 0x00;
        assert_eq!(
            decode_envelope(&bytes),
            Err(DecodeError::PayloadTooLarge {
                declared: 256,
                max: 245
            })
        );
    }

    #[test]
    fn test_corrupted_byte_fails_checksum() {
        // Arrange
        let mut bytes = version_reply().to_bytes();
        bytes[HEADER_SIZE + 2] ^= 0x40;

        // Act
        let result = Envelope::from_bytes(&bytes);

        // Assert
        assert!(matches!(result, Err(DecodeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_from_bytes_rejects_trailing_bytes() {
        let mut bytes = Envelope::wrap(1, Ping).to_bytes();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(Envelope::from_bytes(&bytes), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn test_decode_envelope_reports_consumed_bytes() {
        // Arrange – two frames back to back
        let first = Envelope::wrap(1, Ping);
        let second = Envelope::wrap(2, VersionData::empty());
        let mut stream = first.to_bytes();
        stream.extend_from_slice(&second.to_bytes());

        // Act
        let (decoded_first, used) = decode_envelope(&stream).expect("first frame");
        let (decoded_second, used_second) = decode_envelope(&stream[used..]).expect("second");

        // Assert
        assert_eq!(decoded_first, first);
        assert_eq!(decoded_second, second);
        assert_eq!(used + used_second, stream.len());
    }

    #[test]
    fn test_open_decodes_matching_type() {
        let reply = version_reply();
        let data: VersionData = reply.open().expect("version data");
        assert_eq!(data.mcu_type(), 1);
        assert_eq!(
            reply.message(),
            Ok(SwordFishMessage::VersionData(data))
        );
    }

    #[test]
    fn test_open_rejects_other_type() {
        let reply = version_reply();
        assert_eq!(
            reply.open::<Ping>(),
            Err(DecodeError::TypeMismatch {
                expected: MessageType::Ping,
                actual: MessageType::VersionData,
            })
        );
    }

    #[test]
    fn test_message_reports_length_mismatch_for_short_payload() {
        let env = Envelope::new(
            Direction::FromDevice,
            9,
            MessageType::VersionData,
            vec![0; 4],
        )
        .expect("small payload");
        assert!(matches!(
            env.message(),
            Err(DecodeError::LengthMismatch {
                expected: 11,
                actual: 4,
                ..
            })
        ));
    }
}
