//! Diagnose mode (C7): a one-shot probe that opens the instrument, issues a handful of
//! identification/status queries, prints a header block, then defers to `dump_log`
//! aimed at standard output. No files are opened, no writer thread spawned, no buffers
//! allocated.

use std::io::{self, Write};

use tracing::{error, info};

use crate::config::RunConfig;
use crate::driver::Driver;
use crate::error::Result;

/// Run diagnose mode against `driver`. Failure of any individual query is non-fatal
/// for the remaining queries, but is reflected in the returned `Result`.
///
/// # Errors
/// [`crate::error::AcqError`] if driver initialization failed, or if any of the
/// identification/status queries failed (reported after all queries were attempted).
pub fn run<D: Driver>(mut driver: D, mut cfg: RunConfig) -> Result<()> {
    driver.init(&mut cfg)?;
    info!("diagnose: instrument initialized");

    let mut stdout = io::stdout();
    writeln!(stdout, "=== diagnose ===")?;

    let mut first_error = None;

    match driver.check_if_armed() {
        Ok(armed) => writeln!(stdout, "trigger_status_armed={armed}")?,
        Err(e) => {
            error!(error = %e, "diagnose: check_if_armed query failed");
            first_error.get_or_insert(e);
        }
    }

    match driver.check_if_triggered() {
        Ok(triggered) => writeln!(stdout, "trigger_status_triggered={triggered}")?,
        Err(e) => {
            error!(error = %e, "diagnose: check_if_triggered query failed");
            first_error.get_or_insert(e);
        }
    }

    match driver.list_displayed_channels() {
        Ok(channels) => writeln!(stdout, "displayed_channels={}", channels.join(","))?,
        Err(e) => {
            error!(error = %e, "diagnose: list_displayed_channels query failed");
            first_error.get_or_insert(e);
        }
    }

    if let Err(e) = driver.dump_log(&mut stdout, &cfg) {
        error!(error = %e, "diagnose: dump_log failed");
        first_error.get_or_insert(e);
    }

    if let Err(e) = Box::new(driver).destroy() {
        error!(error = %e, "diagnose: destroy reported an error");
        first_error.get_or_insert(e);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
