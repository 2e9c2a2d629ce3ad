//! Time-based control of PLC output coils over [Modbus/TCP](http://modbus.org/),
//! built on [Tokio](https://docs.rs/tokio).
//!
//! # Features
//!
//! * Weekly and one-shot schedules that assert a coil for a window of time
//! * Restart safe: runtime state is re-derived from the wall clock, never persisted
//! * Optional remote-enable coil per schedule and a heartbeat holding register
//! * Fixed-delay reconnect and cooperative shutdown
//! * A PLC emulator exposing the same register map, driven by its own slot scheduler
//! * Panic-free parsing
//!
//! # Supported functions
//!
//! * Read Coils
//! * Read Holding Registers
//! * Write Single Coil
//! * Write Single Register
//!
//! # Example
//!
//! Run the schedules of a configuration file for one hour:
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use plcsched::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Configuration::load(Path::new("config/config.toml"))?;
//!     let (handle, signal) = shutdown_channel();
//!
//!     let mut controller = Controller::new(&config, SystemClock, DecodeLevel::nothing(), signal);
//!     let stop = async {
//!         tokio::time::sleep(Duration::from_secs(3600)).await;
//!         handle.shutdown();
//!     };
//!     tokio::join!(controller.run(), stop);
//!     Ok(())
//! }
//! ```

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Modbus client and the controller loop
pub mod client;
/// Public constant values, including the emulator's register map
pub mod constants;
/// Emulator register file and server
pub mod server;

// modules that are re-exported
pub(crate) mod clock;
pub(crate) mod config;
pub(crate) mod decode;
pub(crate) mod emulator;
pub(crate) mod error;
pub(crate) mod exception;
pub(crate) mod retry;
pub(crate) mod schedule;
pub(crate) mod shutdown;
pub(crate) mod types;

// internal modules
mod common;

pub use crate::client::*;
pub use crate::clock::*;
pub use crate::config::*;
pub use crate::decode::*;
pub use crate::emulator::*;
pub use crate::error::*;
pub use crate::exception::*;
pub use crate::retry::*;
pub use crate::schedule::*;
pub use crate::shutdown::*;
pub use crate::types::*;
