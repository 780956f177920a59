//! Infrastructure layer for the host.
//!
//! Contains OS-facing adapters: the serial port driver (plus an in-memory
//! fake device for tests) and file-system storage for the configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `swordfish_core`, but MUST NOT be imported by the `application` layer.

pub mod serial;
pub mod storage;
