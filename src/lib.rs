//! A continuous acquisition engine for remote digital oscilloscopes over VISA. Opens a
//! SCPI-speaking instrument, arms and triggers it in a tight loop, and streams captured
//! traces to disk through a double-buffered producer/writer pipeline bounded to a
//! fraction of available RAM.
//!
//! The crate is organized the way a single acquisition run flows through it:
//! [`config`] builds the run's parameters, [`memory`] sizes the double buffers,
//! [`transport`] and [`driver`] talk to the instrument, [`acquire`] sequences a single
//! trace capture, [`orchestrator`] runs the producer/writer pipeline, and [`output`]
//! persists the result. [`diagnose`] is the alternative one-shot entry point.

pub mod acquire;
pub mod config;
pub mod diagnose;
pub mod driver;
pub mod error;
pub mod loopback_driver;
pub mod memory;
pub mod orchestrator;
pub mod output;
pub mod transport;

pub use acquire::default_acquire;
pub use config::{Coding, RunConfig};
pub use driver::{AcqRc, Driver, DriverError};
pub use error::{AcqError, Result};
pub use loopback_driver::LoopbackDriver;
pub use memory::MemoryPlan;
pub use orchestrator::{Orchestrator, RunStats};
pub use transport::Session;
