//! Port I/O abstractions.
//!
//! The application layer never talks to a serial driver directly.  It goes
//! through two traits:
//!
//! - [`SerialBackend`] lists the ports the OS knows about and opens one.
//! - [`SerialTransport`] is an open port: bounded reads and full writes.
//!   Closing a port is dropping its transport.
//!
//! The production implementation lives in
//! `infrastructure::serial::native`; tests use
//! `infrastructure::serial::mock` or the generated `MockSerialBackend`.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Default line speed of the SwordFish firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Errors raised while enumerating or opening serial ports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    /// The OS refused to list its serial ports.
    #[error("failed to enumerate serial ports: {0}")]
    Enumeration(String),

    /// A specific port could not be opened (missing, busy, no permission).
    #[error("failed to open serial port {path}: {reason}")]
    Open { path: String, reason: String },
}

/// Line settings applied when a port is opened.  Framing is always 8N1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// USB descriptor details of a port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsbInfo {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// The bus a serial port is attached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    Usb(UsbInfo),
    Bluetooth,
    Pci,
    Unknown,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Usb(_) => f.write_str("USB Port"),
            PortKind::Bluetooth => f.write_str("Bluetooth Port"),
            PortKind::Pci => f.write_str("PCI Port"),
            PortKind::Unknown => f.write_str("Unknown Port"),
        }
    }
}

/// A port as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS identifier, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    pub kind: PortKind,
}

/// An open serial port.
pub trait SerialTransport: Send {
    /// Reads whatever bytes arrive within `timeout`.
    ///
    /// Returns `Ok(0)` if nothing arrived in time; a timeout is not an error.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Writes every byte of `bytes` or fails.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Access to the serial ports of the host.
#[cfg_attr(test, mockall::automock)]
pub trait SerialBackend: Send + Sync {
    /// Lists every serial port currently present.
    fn list(&self) -> Result<Vec<PortInfo>, PortError>;

    /// Opens `path` with the given line settings.
    fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialTransport>, PortError>;
}
