//! Application layer: the use cases built on top of the protocol crate.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the protocol
//! (pure encode/decode rules in `swordfish-core`) and the infrastructure
//! (serial drivers, files).  Code in this layer:
//!
//! - **Orchestrates** protocol objects to fulfil a goal, e.g. "send a
//!   request and wait for the matching reply".
//! - **Depends on abstractions** (the traits in [`transport`]) rather than on
//!   a concrete serial driver, so tests can plug in a fake device.
//! - **Contains no OS calls**.
//!
//! # Sub-modules
//!
//! - **`transport`**    – The `SerialBackend` / `SerialTransport` traits and
//!   the port description types they exchange.
//!
//! - **`port_finder`**  – Lists serial ports and works out which one the
//!   device is attached to.
//!
//! - **`comm_session`** – Owns an open port and performs request/reply
//!   exchanges with tx/rx bookkeeping.

pub mod comm_session;
pub mod port_finder;
pub mod transport;
