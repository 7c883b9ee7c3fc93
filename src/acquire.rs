//! The acquire routine (C8): a reference implementation of the per-trace acquisition
//! sequence, generic over any [`Driver`]. This is the default the `run` entry point
//! wires up; [`crate::orchestrator::Orchestrator::run`] accepts any
//! `FnMut(&mut D, &mut [u8], &RunConfig) -> AcqRc` so integrators can substitute their
//! own sequencing without touching the orchestrator.

use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::RunConfig;
use crate::driver::{AcqRc, Driver, ACQ_ERR_ARM_TIMEOUT, ACQ_ERR_TRIGGER_TIMEOUT, ACQ_OK};
use crate::error::Result;

/// Generic driver-level failure that is not one of the two named soft-miss sentinels.
const ACQ_ERR_DRIVER: AcqRc = -1;

/// How long to poll `check_if_armed` before reporting [`ACQ_ERR_ARM_TIMEOUT`].
pub const DEFAULT_ARM_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to poll `check_if_triggered` before reporting [`ACQ_ERR_TRIGGER_TIMEOUT`].
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(5);
/// Spacing between successive polls of the armed/triggered status.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Arm, poll until armed (or time out), force-trigger, poll until triggered (or time
/// out), then read the trace into `dst`.
pub fn default_acquire<D: Driver>(driver: &mut D, dst: &mut [u8], cfg: &RunConfig) -> AcqRc {
    if let Err(e) = driver.arm() {
        warn!(error = %e, "arm failed");
        return ACQ_ERR_DRIVER;
    }

    match poll_until(DEFAULT_ARM_TIMEOUT, || driver.check_if_armed()) {
        Ok(true) => {}
        Ok(false) => return ACQ_ERR_ARM_TIMEOUT,
        Err(e) => {
            warn!(error = %e, "error polling arm status");
            return ACQ_ERR_DRIVER;
        }
    }

    if let Err(e) = driver.force_trigger() {
        warn!(error = %e, "force_trigger failed");
        return ACQ_ERR_DRIVER;
    }

    match poll_until(DEFAULT_TRIGGER_TIMEOUT, || driver.check_if_triggered()) {
        Ok(true) => {}
        Ok(false) => return ACQ_ERR_TRIGGER_TIMEOUT,
        Err(e) => {
            warn!(error = %e, "error polling trigger status");
            return ACQ_ERR_DRIVER;
        }
    }

    match driver.read_trace(dst, cfg) {
        Ok(()) => ACQ_OK,
        Err(e) => {
            warn!(error = %e, "read_trace failed");
            ACQ_ERR_DRIVER
        }
    }
}

fn poll_until(budget: Duration, mut check: impl FnMut() -> Result<bool>) -> Result<bool> {
    let deadline = Instant::now() + budget;
    loop {
        if check()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
