//! The driver contract (C2): an instrument driver's capability set expressed as a Rust
//! trait rather than a C-style function-pointer table. The `AcqRc` sentinel convention
//! is load-bearing: the orchestrator's soft-miss/hard-failure branches key off the
//! exact values.

use std::io::Write;

use crate::config::RunConfig;
use crate::error::Result;

/// The return code an acquire attempt reports back to the orchestrator.
pub type AcqRc = i32;

/// The attempt succeeded; `read_trace` filled the destination buffer.
pub const ACQ_OK: AcqRc = 0;
/// The instrument did not report armed/ready before the arm-timeout budget expired.
pub const ACQ_ERR_ARM_TIMEOUT: AcqRc = -1000;
/// The instrument did not report triggered/stopped before the trigger-timeout budget
/// expired.
pub const ACQ_ERR_TRIGGER_TIMEOUT: AcqRc = -1001;

/// `true` for the two recognized soft-miss sentinels; any other negative value is a
/// hard failure.
#[must_use]
pub const fn is_soft_miss(rc: AcqRc) -> bool {
    rc == ACQ_ERR_ARM_TIMEOUT || rc == ACQ_ERR_TRIGGER_TIMEOUT
}

/// Errors a [`Driver`] method can report. Distinct from [`crate::error::AcqError`]
/// because a driver implementation lives outside this crate's control and should not
/// need to know this crate's full error taxonomy.
#[derive(thiserror::Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum DriverError {
    /// The instrument replied with something the driver did not expect.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The waveform preamble could not be parsed.
    #[error("preamble parse error: {0}")]
    PreambleParse(String),

    /// A transport-level error surfaced while talking to the instrument.
    #[error(transparent)]
    Transport(#[from] crate::error::TransportError),
}

impl From<DriverError> for crate::error::AcqError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e.to_string())
    }
}

/// The fixed capability set an oscilloscope driver must implement.
pub trait Driver: Send {
    /// Open the transport (explicit or auto), select record format and acquisition
    /// mode, arm a single-sweep trigger, resolve the default channel list if the
    /// caller supplied none, and if `cfg.n_samples == 0`, compute `n_samples` and
    /// `raw_start_idx` from the instrument's current timebase/preamble and write them
    /// back into `cfg`.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] if the transport could not be opened or the
    /// instrument rejected setup.
    fn init(&mut self, cfg: &mut RunConfig) -> Result<()>;

    /// Stop acquisition and close the transport. Consumes the driver since nothing
    /// further can be done with it afterward.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] if the instrument could not be stopped cleanly; the
    /// transport is still closed on the caller's behalf regardless.
    fn destroy(self: Box<Self>) -> Result<()>;

    /// Issue a single-shot arm.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure.
    fn arm(&mut self) -> Result<()>;

    /// Halt acquisition.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure.
    fn stop(&mut self) -> Result<()>;

    /// Issue a software trigger.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure.
    fn force_trigger(&mut self) -> Result<()>;

    /// `true` once the instrument reports armed/ready.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure.
    fn check_if_armed(&mut self) -> Result<bool>;

    /// `true` once the instrument reports triggered/stopped.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure.
    fn check_if_triggered(&mut self) -> Result<bool>;

    /// Fill `dst` with exactly `n_channels * n_samples * bytes_per_sample` bytes,
    /// laid out channel-major (all samples of channel 0, then channel 1, ...).
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure or malformed reply.
    fn read_trace(&mut self, dst: &mut [u8], cfg: &RunConfig) -> Result<()>;

    /// Channel names currently displayed on the instrument.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure.
    fn list_displayed_channels(&mut self) -> Result<Vec<String>>;

    /// Close and reopen the underlying transport session, verifying it with `*IDN?`.
    ///
    /// Not part of the original `ScopeDriver` vtable; added so the orchestrator (which
    /// is generic over `D: Driver` and never sees a concrete transport session) can
    /// still drive the hard-failure reconnect step described for the transport layer.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] if the transport could not be reopened.
    fn reconnect(&mut self) -> Result<()>;

    /// Write a human-readable `key=value` dump of instrument identity, per-channel
    /// settings, waveform preamble, and timebase-derived sample window.
    ///
    /// # Errors
    /// [`crate::error::AcqError`] on transport failure, or [`std::io::Error`] wrapped
    /// the same way if `out` itself fails.
    fn dump_log(&mut self, out: &mut dyn Write, cfg: &RunConfig) -> Result<()>;
}
