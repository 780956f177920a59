//! Serial port discovery.
//!
//! Works out which serial port a SwordFish device is attached to.
//!
//! # How does discovery work? (for beginners)
//!
//! The OS lists every serial port it knows, but it cannot tell us what sits
//! on the other end of the cable.  Discovery therefore runs in two stages:
//!
//! 1. **Filter** – USB-serial bridges report a vendor id (VID) and product
//!    id (PID).  SwordFish boards use a handful of known bridge chips, so a
//!    port whose VID/PID matches one of the configured [`UsbSignature`]s (or
//!    whose path contains a configured pattern) is marked *probable*.  If
//!    exactly one port is probable, it is the answer.
//!
//! 2. **Probe** – If the filter is ambiguous, each remaining port is opened
//!    in turn, sent a `Ping` envelope and given `probe_timeout` to answer
//!    with any well-formed device frame.  The first port that answers wins.
//!
//! Probes run strictly one after another and every probe is bounded, so a
//! discovery call never takes longer than `probe_timeout` times the number
//! of probed ports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use swordfish_core::{Direction, Envelope, FrameAccumulator, Ping};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::application::transport::{PortInfo, PortKind, SerialBackend, SerialSettings, UsbInfo};

/// Error type for discovery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// No port looks like, or answers like, a SwordFish device.
    #[error("no SwordFish device found")]
    NotFound,
}

/// A USB-serial bridge known to be fitted on SwordFish boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbSignature {
    /// Display name, only used in logs.
    pub name: String,
    pub vid: u16,
    pub pid: u16,
    /// If set, the manufacturer string must match too (ignoring case).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
}

impl UsbSignature {
    pub fn matches(&self, usb: &UsbInfo) -> bool {
        if usb.vid != self.vid || usb.pid != self.pid {
            return false;
        }
        match (&self.manufacturer, &usb.manufacturer) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }
}

/// The bridges used on shipped SwordFish boards.
pub fn default_signatures() -> Vec<UsbSignature> {
    vec![
        UsbSignature {
            name: "Silicon Labs CP210x".to_string(),
            vid: 0x10C4,
            pid: 0xEA60,
            manufacturer: Some("Silicon Labs".to_string()),
        },
        UsbSignature {
            name: "FTDI FT230X".to_string(),
            vid: 0x0403,
            pid: 0x6015,
            manufacturer: Some("FTDI".to_string()),
        },
    ]
}

/// Tunables for [`PortFinder`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    /// How long a probed port gets to answer the `Ping`.
    pub probe_timeout: Duration,
    /// Read slice used while waiting for a probe answer.
    pub poll_interval: Duration,
    /// Probe every port when none matches the filter.
    pub probe_unmatched: bool,
    /// Substrings of port paths that mark a port as probable.
    pub path_patterns: Vec<String>,
    pub signatures: Vec<UsbSignature>,
    /// Line settings used to open probed ports.
    pub serial: SerialSettings,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(150),
            poll_interval: Duration::from_millis(10),
            probe_unmatched: true,
            path_patterns: Vec::new(),
            signatures: default_signatures(),
            serial: SerialSettings::default(),
        }
    }
}

/// A serial port considered during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub path: String,
    pub kind: PortKind,
    /// Whether the signature / path filter judged this port probable.
    pub matched: bool,
}

/// Finds the serial port a SwordFish device is attached to.
pub struct PortFinder {
    backend: Arc<dyn SerialBackend>,
    settings: DiscoverySettings,
}

impl PortFinder {
    pub fn new(backend: Arc<dyn SerialBackend>, settings: DiscoverySettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Lists every serial port with its filter verdict.
    ///
    /// Returns an empty list when the OS has no ports or refuses to list
    /// them; the latter is logged.
    pub fn list_serial_ports(&self) -> Vec<PortCandidate> {
        match self.backend.list() {
            Ok(ports) => ports
                .into_iter()
                .map(|port| {
                    let matched = self.is_probable(&port);
                    PortCandidate {
                        path: port.path,
                        kind: port.kind,
                        matched,
                    }
                })
                .collect(),
            Err(e) => {
                error!("error listing serial ports: {e}");
                Vec::new()
            }
        }
    }

    /// Applies the signature and path-pattern filter to one port.
    pub fn is_probable(&self, port: &PortInfo) -> bool {
        let by_signature = match &port.kind {
            PortKind::Usb(usb) => self.settings.signatures.iter().any(|s| s.matches(usb)),
            _ => false,
        };
        by_signature
            || self
                .settings
                .path_patterns
                .iter()
                .any(|pattern| !pattern.is_empty() && port.path.contains(pattern.as_str()))
    }

    /// Returns the port the device is most likely attached to.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NotFound`] when there are no ports, or
    /// when no probed port answered.
    pub fn find_probable_port(&self) -> Result<PortCandidate, DiscoveryError> {
        let candidates = self.list_serial_ports();
        if candidates.is_empty() {
            info!("no serial ports present");
            return Err(DiscoveryError::NotFound);
        }

        let matched: Vec<&PortCandidate> = candidates.iter().filter(|c| c.matched).collect();
        if let [only] = matched.as_slice() {
            info!("found probable SwordFish port {}", only.path);
            return Ok((*only).clone());
        }

        let to_probe: Vec<&PortCandidate> = if !matched.is_empty() {
            matched
        } else if self.settings.probe_unmatched {
            candidates.iter().collect()
        } else {
            Vec::new()
        };

        debug!(count = to_probe.len(), "probing candidate ports");
        for candidate in to_probe {
            if self.probe(&candidate.path) {
                info!("SwordFish device answered on {}", candidate.path);
                return Ok(candidate.clone());
            }
        }

        info!("no SwordFish device answered");
        Err(DiscoveryError::NotFound)
    }

    /// Human readable listing of every port, with USB descriptor details.
    pub fn port_report(&self) -> String {
        let ports = self.list_serial_ports();
        let mut report = format!("Number of serial ports: {}\n", ports.len());
        for (i, port) in ports.iter().enumerate() {
            let marker = if port.matched { " (probable SwordFish)" } else { "" };
            report.push_str(&format!("{i} : {} : {}{marker}\n", port.kind, port.path));
            if let PortKind::Usb(usb) = &port.kind {
                let or_none = |s: &Option<String>| s.as_deref().unwrap_or("None").to_string();
                report.push_str(&format!("  - VID: 0x{:04x}\n", usb.vid));
                report.push_str(&format!("  - PID: 0x{:04x}\n", usb.pid));
                report.push_str(&format!("  - Serial Number: {}\n", or_none(&usb.serial_number)));
                report.push_str(&format!("  - Manufacturer: {}\n", or_none(&usb.manufacturer)));
                report.push_str(&format!("  - Product: {}\n", or_none(&usb.product)));
            }
        }
        report
    }

    /// Opens `path`, sends a `Ping` and waits for any device frame.
    ///
    /// The port is closed again before this returns.
    fn probe(&self, path: &str) -> bool {
        let mut transport = match self.backend.open(path, &self.settings.serial) {
            Ok(t) => t,
            Err(e) => {
                debug!("probe of {path} skipped: {e}");
                return false;
            }
        };

        if let Err(e) = transport.write_all(&Envelope::wrap(0, Ping).to_bytes()) {
            debug!("probe write to {path} failed: {e}");
            return false;
        }

        let deadline = Instant::now() + self.settings.probe_timeout;
        let mut accumulator = FrameAccumulator::new(Direction::FromDevice);
        let mut buf = [0u8; 256];
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!("probe of {path} timed out");
                return false;
            }
            let slice = (deadline - now).min(self.settings.poll_interval);
            match transport.read(&mut buf, slice) {
                Ok(0) => {}
                Ok(n) => {
                    accumulator.push(&buf[..n]);
                    if accumulator.next_envelope().is_some() {
                        return true;
                    }
                }
                Err(e) => {
                    debug!("probe read from {path} failed: {e}");
                    return false;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
