//! The SwordFish message catalog.
//!
//! Every message the host and the device exchange is listed here together
//! with its binary payload layout.  The envelope (see
//! [`crate::protocol::envelope`]) carries the message type byte and the
//! payload length, so the payloads themselves contain only the message
//! fields.  All multi-byte integers are big-endian.

use std::fmt;

use crate::protocol::error::{DecodeError, ValidationError};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Encoded size of a [`VersionData`] payload.
pub const VERSION_DATA_SIZE: usize = 11;

/// Length of the device identifier carried in [`VersionData`].
pub const UUID_SIZE: usize = 8;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type codes understood by the SwordFish firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Ping = 0x00,
    VersionData = 0x02,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::Ping),
            0x02 => Ok(MessageType::VersionData),
            _ => Err(()),
        }
    }
}

impl MessageType {
    /// How the firmware treats a message of this type.
    pub fn category(self) -> MessageCategory {
        match self {
            MessageType::Ping => MessageCategory::Bounce,
            MessageType::VersionData => MessageCategory::Bounce,
        }
    }

    /// The message type the device answers a request of this type with, if any.
    pub fn reply_type(self) -> Option<MessageType> {
        self.category().reply_type(self)
    }

    /// Exact payload length required to decode this type, or `None` if any
    /// length is accepted.
    pub fn payload_len(self) -> Option<usize> {
        match self {
            MessageType::Ping => None,
            MessageType::VersionData => Some(VERSION_DATA_SIZE),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Ping => "PING",
            MessageType::VersionData => "VERSION_DATA",
        };
        write!(f, "{name} (0x{:02X})", *self as u8)
    }
}

/// Request/response behaviour of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    /// Sent to the device, which sends it straight back.
    Bounce,
    /// Sets or reads a device parameter; answered with the same type.
    Param,
    /// Asks the device to perform an operation; answered with the given type.
    Operation(MessageType),
    /// Only ever sent by the device as the answer to an operation.
    Response,
}

impl MessageCategory {
    /// The type a `request` of this category is answered with.  `None` for
    /// responses, which the host never sends.
    pub fn reply_type(self, request: MessageType) -> Option<MessageType> {
        match self {
            MessageCategory::Bounce | MessageCategory::Param => Some(request),
            MessageCategory::Operation(response) => Some(response),
            MessageCategory::Response => None,
        }
    }
}

// ── Catalog contract ──────────────────────────────────────────────────────────

/// Contract shared by every message in the catalog.
///
/// `encode` and `decode` are pure: `decode(&m.encode())` always yields `m`.
pub trait CatalogMessage: Sized + Clone + fmt::Debug + Into<SwordFishMessage> {
    /// The type byte stamped into the envelope.
    const MESSAGE_TYPE: MessageType;

    /// Serializes the message fields into a payload.
    fn encode(&self) -> Vec<u8>;

    /// Parses a payload produced by [`CatalogMessage::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::LengthMismatch`] if the payload does not have
    /// the size this message requires.
    fn decode(payload: &[u8]) -> Result<Self, DecodeError>;

    /// One-line human readable description, for logs and diagnostics.
    fn describe(&self) -> String {
        format!("{} {:?}", Self::MESSAGE_TYPE, self)
    }
}

// ── Ping ──────────────────────────────────────────────────────────────────────

/// PING (0x00): liveness probe with an empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

impl CatalogMessage for Ping {
    const MESSAGE_TYPE: MessageType = MessageType::Ping;

    fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Accepts any payload; a probe carries nothing worth validating.
    fn decode(_payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(Ping)
    }
}

// ── VersionData ───────────────────────────────────────────────────────────────

/// VERSION_DATA (0x02): firmware identification reported by the device.
///
/// Payload layout (11 bytes):
///
/// ```text
/// [mcu_type:1][subversion:2][uuid:8]
/// ```
///
/// The host usually sends an [`VersionData::empty`] request and the device
/// answers with its real values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VersionData {
    mcu_type: u8,
    subversion: u16,
    uuid: [u8; UUID_SIZE],
}

impl VersionData {
    /// Creates a message from already validated field values.
    pub fn new(mcu_type: u8, subversion: u16, uuid: [u8; UUID_SIZE]) -> Self {
        Self {
            mcu_type,
            subversion,
            uuid,
        }
    }

    /// All-zero message, the canonical request sent to the device.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn mcu_type(&self) -> u8 {
        self.mcu_type
    }

    pub fn subversion(&self) -> u16 {
        self.subversion
    }

    pub fn uuid(&self) -> [u8; UUID_SIZE] {
        self.uuid
    }

    pub fn set_mcu_type(&mut self, mcu_type: u8) {
        self.mcu_type = mcu_type;
    }

    pub fn set_subversion(&mut self, subversion: u16) {
        self.subversion = subversion;
    }

    /// Replaces the device identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UuidLength`] unless `uuid` is exactly
    /// eight bytes long; the message is left unchanged in that case.
    pub fn set_uuid(&mut self, uuid: &[u8]) -> Result<(), ValidationError> {
        self.uuid = uuid
            .try_into()
            .map_err(|_| ValidationError::UuidLength {
                expected: UUID_SIZE,
                actual: uuid.len(),
            })?;
        Ok(())
    }
}

impl CatalogMessage for VersionData {
    const MESSAGE_TYPE: MessageType = MessageType::VersionData;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(VERSION_DATA_SIZE);
        buf.push(self.mcu_type);
        buf.extend_from_slice(&self.subversion.to_be_bytes());
        buf.extend_from_slice(&self.uuid);
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != VERSION_DATA_SIZE {
            return Err(DecodeError::LengthMismatch {
                message_type: Self::MESSAGE_TYPE,
                expected: VERSION_DATA_SIZE,
                actual: payload.len(),
            });
        }
        let mut uuid = [0u8; UUID_SIZE];
        uuid.copy_from_slice(&payload[3..]);
        Ok(Self {
            mcu_type: payload[0],
            subversion: u16::from_be_bytes([payload[1], payload[2]]),
            uuid,
        })
    }

    fn describe(&self) -> String {
        format!(
            "{} mcu_type={} subversion={} uuid={:02X?}",
            Self::MESSAGE_TYPE,
            self.mcu_type,
            self.subversion,
            self.uuid
        )
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Any message from the catalog, discriminated by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwordFishMessage {
    Ping(Ping),
    VersionData(VersionData),
}

impl SwordFishMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            SwordFishMessage::Ping(_) => MessageType::Ping,
            SwordFishMessage::VersionData(_) => MessageType::VersionData,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            SwordFishMessage::Ping(m) => m.encode(),
            SwordFishMessage::VersionData(m) => m.encode(),
        }
    }

    /// Decodes `payload` as the catalog message selected by `message_type`.
    ///
    /// # Errors
    ///
    /// Propagates the per-message [`DecodeError`].
    pub fn decode(message_type: MessageType, payload: &[u8]) -> Result<Self, DecodeError> {
        match message_type {
            MessageType::Ping => Ping::decode(payload).map(SwordFishMessage::Ping),
            MessageType::VersionData => {
                VersionData::decode(payload).map(SwordFishMessage::VersionData)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SwordFishMessage::Ping(m) => m.describe(),
            SwordFishMessage::VersionData(m) => m.describe(),
        }
    }
}

impl From<Ping> for SwordFishMessage {
    fn from(m: Ping) -> Self {
        SwordFishMessage::Ping(m)
    }
}

impl From<VersionData> for SwordFishMessage {
    fn from(m: VersionData) -> Self {
        SwordFishMessage::VersionData(m)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
