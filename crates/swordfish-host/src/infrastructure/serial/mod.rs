//! Serial port adapters.
//!
//! - **`native`** – Real ports through the `serialport` crate (8N1).
//! - **`mock`**   – An in-memory SwordFish device and backend, so sessions
//!   and discovery can be exercised without hardware.

pub mod mock;
pub mod native;
