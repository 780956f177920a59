//! In-memory SwordFish device and serial backend for testing.
//!
//! Allows sessions and discovery to run against a simulated device without
//! real hardware.  The device parses the frames the host writes, answers
//! according to its [`DeviceBehavior`], and hands the answer back through
//! bounded reads, optionally a few bytes at a time.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use swordfish_core::{Direction, Envelope, FrameAccumulator, MessageType, VersionData};

use crate::application::transport::{
    PortError, PortInfo, PortKind, SerialBackend, SerialSettings, SerialTransport,
};

type Responder = Box<dyn FnMut(&Envelope) -> Vec<Vec<u8>> + Send>;

/// How a [`FakeDevice`] answers the frames it receives.
pub enum DeviceBehavior {
    /// Sends every request straight back, like the firmware's bounce messages.
    Echo,
    /// Answers `VersionData` requests with the given identity and echoes
    /// everything else.
    VersionResponder(VersionData),
    /// Never answers.
    Silent,
    /// Calls the closure for every request and sends back the byte chunks it
    /// returns, in order.
    Scripted(Responder),
}

struct DeviceState {
    behavior: DeviceBehavior,
    inbound: FrameAccumulator,
    outbound: VecDeque<u8>,
    chunk_size: Option<usize>,
    fail_writes: bool,
    fail_reads: bool,
    requests: Vec<Envelope>,
    open_handles: usize,
}

/// A simulated SwordFish board.  Clones share the same device.
#[derive(Clone)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(behavior: DeviceBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                behavior,
                inbound: FrameAccumulator::new(Direction::ToDevice),
                outbound: VecDeque::new(),
                chunk_size: None,
                fail_writes: false,
                fail_reads: false,
                requests: Vec::new(),
                open_handles: 0,
            })),
        }
    }

    pub fn echo() -> Self {
        Self::new(DeviceBehavior::Echo)
    }

    pub fn version_responder(version: VersionData) -> Self {
        Self::new(DeviceBehavior::VersionResponder(version))
    }

    pub fn silent() -> Self {
        Self::new(DeviceBehavior::Silent)
    }

    pub fn scripted(responder: impl FnMut(&Envelope) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        Self::new(DeviceBehavior::Scripted(Box::new(responder)))
    }

    /// Limits every read to at most `size` bytes.
    pub fn with_chunk_size(self, size: usize) -> Self {
        self.lock().chunk_size = Some(size.max(1));
        self
    }

    /// Queues raw bytes for the host to read, e.g. noise or a stray frame.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.lock().outbound.extend(bytes.iter().copied());
    }

    /// Makes every following write fail.
    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    /// Makes every following read fail.
    pub fn fail_reads(&self) {
        self.lock().fail_reads = true;
    }

    /// Every frame the device has received so far.
    pub fn requests(&self) -> Vec<Envelope> {
        self.lock().requests.clone()
    }

    /// Number of transports currently open on this device.
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// Opens a new transport on this device.
    pub fn transport(&self) -> Box<dyn SerialTransport> {
        self.lock().open_handles += 1;
        Box::new(FakeTransport {
            device: self.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().expect("lock poisoned")
    }
}

impl DeviceState {
    fn receive(&mut self, bytes: &[u8]) {
        self.inbound.push(bytes);
        while let Some(request) = self.inbound.next_envelope() {
            let answers = match &mut self.behavior {
                DeviceBehavior::Echo => vec![echo(&request)],
                DeviceBehavior::VersionResponder(version) => {
                    if request.message_type() == MessageType::VersionData {
                        vec![Envelope::reply_to(&request, *version).to_bytes()]
                    } else {
                        vec![echo(&request)]
                    }
                }
                DeviceBehavior::Silent => Vec::new(),
                DeviceBehavior::Scripted(responder) => responder(&request),
            };
            for answer in answers {
                self.outbound.extend(answer);
            }
            self.requests.push(request);
        }
    }
}

/// Bounces `request` back with the same type, id and payload.
fn echo(request: &Envelope) -> Vec<u8> {
    Envelope::new(
        request.direction().reverse(),
        request.message_id(),
        request.message_type(),
        request.payload().to_vec(),
    )
    .map(|reply| reply.to_bytes())
    .unwrap_or_default()
}

struct FakeTransport {
    device: FakeDevice,
}

impl SerialTransport for FakeTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut state = self.device.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if state.outbound.is_empty() {
            drop(state);
            std::thread::sleep(timeout);
            return Ok(0);
        }
        let limit = state.chunk_size.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.device.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state.receive(bytes);
        Ok(())
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        let mut state = self.device.lock();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

// ── Backend ───────────────────────────────────────────────────────────────────

struct FakePort {
    info: PortInfo,
    device: Option<FakeDevice>,
}

#[derive(Default)]
struct BackendLog {
    opened: Vec<String>,
    settings: Vec<SerialSettings>,
}

/// A set of fake ports, some of them with a device attached.
#[derive(Default)]
pub struct FakeSerialBackend {
    ports: Vec<FakePort>,
    list_error: Option<PortError>,
    log: Mutex<BackendLog>,
}

impl FakeSerialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a port with `device` attached.
    pub fn with_device(mut self, path: &str, kind: PortKind, device: FakeDevice) -> Self {
        self.ports.push(FakePort {
            info: PortInfo {
                path: path.to_string(),
                kind,
            },
            device: Some(device),
        });
        self
    }

    /// Adds a port that is listed but cannot be opened.
    pub fn with_unopenable_port(mut self, path: &str, kind: PortKind) -> Self {
        self.ports.push(FakePort {
            info: PortInfo {
                path: path.to_string(),
                kind,
            },
            device: None,
        });
        self
    }

    /// Makes [`SerialBackend::list`] fail.
    pub fn with_list_error(mut self, error: PortError) -> Self {
        self.list_error = Some(error);
        self
    }

    /// Paths opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.log.lock().expect("lock poisoned").opened.clone()
    }

    /// Settings passed to every open, in order.
    pub fn open_settings(&self) -> Vec<SerialSettings> {
        self.log.lock().expect("lock poisoned").settings.clone()
    }

    /// Whether any port of this backend is still open.
    pub fn any_open(&self) -> bool {
        self.ports
            .iter()
            .filter_map(|p| p.device.as_ref())
            .any(|d| d.open_handles() > 0)
    }

    fn port(&self, path: &str) -> Option<&FakePort> {
        self.ports.iter().find(|p| p.info.path == path)
    }
}

impl SerialBackend for FakeSerialBackend {
    fn list(&self) -> Result<Vec<PortInfo>, PortError> {
        if let Some(e) = &self.list_error {
            return Err(e.clone());
        }
        Ok(self.ports.iter().map(|p| p.info.clone()).collect())
    }

    fn open(
        &self,
        path: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn SerialTransport>, PortError> {
        {
            let mut log = self.log.lock().expect("lock poisoned");
            log.opened.push(path.to_string());
            log.settings.push(settings.clone());
        }
        match self.port(path).and_then(|p| p.device.as_ref()) {
            Some(device) => Ok(device.transport()),
            None => Err(PortError::Open {
                path: path.to_string(),
                reason: "no such device".to_string(),
            }),
        }
    }
}
