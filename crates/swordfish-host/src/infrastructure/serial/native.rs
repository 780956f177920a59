//! Serial backend backed by the `serialport` crate.
//!
//! Ports are opened 8N1 without flow control.  `serialport` reports a read
//! that times out as an `io::ErrorKind::TimedOut` error; the adapter turns it
//! into `Ok(0)` as the [`SerialTransport`] contract requires.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::debug;

use crate::application::transport::{
    PortError, PortInfo, PortKind, SerialBackend, SerialSettings, SerialTransport, UsbInfo,
};

/// Timeout applied when the port is opened; reads override it per call.
const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_millis(10);

/// The host's real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSerialBackend;

impl NativeSerialBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for NativeSerialBackend {
    fn list(&self) -> Result<Vec<PortInfo>, PortError> {
        let ports =
            serialport::available_ports().map_err(|e| PortError::Enumeration(e.to_string()))?;
        Ok(ports
            .into_iter()
            .map(|port| PortInfo {
                path: port.port_name,
                kind: port_kind(port.port_type),
            })
            .collect())
    }

    fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialTransport>, PortError> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_PORT_TIMEOUT)
            .open()
            .map_err(|e| PortError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        debug!("opened {path} at {} baud", settings.baud_rate);
        Ok(Box::new(NativeSerialTransport { port }))
    }
}

fn port_kind(port_type: SerialPortType) -> PortKind {
    match port_type {
        SerialPortType::UsbPort(info) => PortKind::Usb(UsbInfo {
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial_number: info.serial_number,
        }),
        SerialPortType::BluetoothPort => PortKind::Bluetooth,
        SerialPortType::PciPort => PortKind::Pci,
        SerialPortType::Unknown => PortKind::Unknown,
    }
}

/// An open OS serial port.  Dropping it closes the port.
struct NativeSerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport for NativeSerialTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if self.port.timeout() != timeout {
            self.port.set_timeout(timeout)?;
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}
