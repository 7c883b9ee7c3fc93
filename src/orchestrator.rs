//! The acquisition orchestrator (C5) — the hard core. Two OS threads (producer,
//! writer) hand off full batches through a ping-pong pair of buffers guarded by one
//! `Mutex` plus two `Condvar`s, matching the original engine's design 1:1 rather than
//! reshaping it into a channel, because the ping-pong buffer identity is directly
//! observable state the tests assert on.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::driver::{is_soft_miss, AcqRc, Driver, ACQ_OK};
use crate::error::{AcqError, Result};
use crate::memory::MemoryPlan;
use crate::output::OutputFiles;

/// Sleep between iterations in no-store mode, to avoid spinning the producer loop.
const NO_STORE_THROTTLE: Duration = Duration::from_millis(500);
/// Backoff before attempting a reconnect after a hard acquisition failure.
const HARD_FAILURE_BACKOFF: Duration = Duration::from_secs(1);
/// How long each condvar wait blocks before re-checking the stop flag. Bounds the
/// cancellation-liveness guarantee: both threads notice `stop` within this interval
/// even if a notify is somehow missed.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Diagnostics and final counters for a completed run, returned from
/// [`Orchestrator::run`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    /// Total traces the acquire routine reported as successfully captured.
    pub total_traces_captured: u64,
    /// Total traces durably written to the output file (or counted, in no-store mode).
    pub total_traces_written: u64,
    /// Number of hand-offs where the producer had to wait for the writer.
    pub handovers_waited: u64,
    /// Number of hand-offs where the writer was already caught up.
    pub handovers_nowait: u64,
}

/// The four fields involved in the producer/writer hand-off; guarded by one mutex so
/// the ping-pong protocol's invariants (at most one ready batch) are checked
/// atomically.
struct HandoffState {
    ready_batches: u8,
    next_write_batch_idx: usize,
    total_traces_written: u64,
    handovers_waited: u64,
    handovers_nowait: u64,
}

/// State reachable from both threads. Each buffer is individually mutex-guarded
/// (rather than relying on an unchecked "whoever owns the flag owns the memory"
/// invariant) so the hand-off protocol is enforced by the type system with zero
/// `unsafe` code; in steady state only one thread ever contends for a given buffer's
/// lock, since the `ready_batches` protocol never lets both sides want the same half
/// at once.
struct Shared {
    state: Mutex<HandoffState>,
    can_write: Condvar,
    written: Condvar,
    buffers: [Mutex<Vec<u8>>; 2],
    stop: Arc<AtomicBool>,
    output: Option<Mutex<OutputFiles>>,
}

/// Orchestrates a complete acquisition run (C5). Stateless; all per-run state lives on
/// the stack of [`Orchestrator::run`].
#[allow(clippy::module_name_repetitions)]
pub struct Orchestrator;

impl Orchestrator {
    /// Run a complete acquisition: initialize the driver, allocate the double buffers,
    /// open output files if `cfg.outfile` is set, then drive the producer/writer loop
    /// until `cfg.n_traces` traces are captured (or forever, if `0`) or the stop flag
    /// is set.
    ///
    /// # Errors
    /// [`AcqError`] if driver initialization, memory planning, file creation, or
    /// thread spawning fails.
    pub fn run<D: Driver + 'static>(
        mut driver: D,
        mut cfg: RunConfig,
        mut acquire: impl FnMut(&mut D, &mut [u8], &RunConfig) -> AcqRc,
    ) -> Result<RunStats> {
        let stop = Arc::new(AtomicBool::new(false));
        install_signal_handler(&stop);

        driver.init(&mut cfg)?;
        let plan = MemoryPlan::compute(&cfg)?;
        info!(
            bytes_per_trace = plan.bytes_per_trace,
            bytes_per_flush_batch = plan.bytes_per_flush_batch,
            "memory plan computed"
        );

        let store_mode = cfg.outfile.is_some();
        let output = if let Some(base) = cfg.outfile.clone() {
            Some(Mutex::new(OutputFiles::create(&base, &cfg, |w| {
                driver.dump_log(w, &cfg)
            })?))
        } else {
            driver.dump_log(&mut io::stdout(), &cfg)?;
            None
        };

        let buf_a = vec![0u8; plan.bytes_per_flush_batch];
        let buf_b = vec![0u8; plan.bytes_per_flush_batch];

        let shared = Arc::new(Shared {
            state: Mutex::new(HandoffState {
                ready_batches: 0,
                next_write_batch_idx: 0,
                total_traces_written: 0,
                handovers_waited: 0,
                handovers_nowait: 0,
            }),
            can_write: Condvar::new(),
            written: Condvar::new(),
            buffers: [Mutex::new(buf_a), Mutex::new(buf_b)],
            stop: Arc::clone(&stop),
            output,
        });

        let writer_handle = if store_mode {
            let shared_for_writer = Arc::clone(&shared);
            let batch_bytes = plan.bytes_per_flush_batch;
            let n_flush_traces = cfg.n_flush_traces as u64;
            Some(
                thread::Builder::new()
                    .name("acq-writer".into())
                    .spawn(move || writer_loop(&shared_for_writer, batch_bytes, n_flush_traces))
                    .map_err(|e| AcqError::Resource(format!("spawn writer thread: {e}")))?,
            )
        } else {
            None
        };

        let producer_result = producer_loop(
            &mut driver,
            &mut cfg,
            &mut acquire,
            &shared,
            plan.bytes_per_trace,
            store_mode,
        );

        stop.store(true, Ordering::SeqCst);
        shared.can_write.notify_all();
        if let Some(handle) = writer_handle {
            let _ = handle.join();
        }

        let (total_traces_written, handovers_waited, handovers_nowait) = {
            let state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            (
                state.total_traces_written,
                state.handovers_waited,
                state.handovers_nowait,
            )
        };

        if let Some(output_mutex) = Arc::try_unwrap(shared)
            .ok()
            .and_then(|s| s.output)
        {
            output_mutex.into_inner().unwrap_or_else(|e| e.into_inner()).finish()?;
        }

        let destroy_result = Box::new(driver).destroy();
        if let Err(e) = destroy_result {
            warn!(error = %e, "driver destroy reported an error during shutdown");
        }

        producer_result.map(|mut s| {
            s.total_traces_written = total_traces_written;
            s.handovers_waited = handovers_waited;
            s.handovers_nowait = handovers_nowait;
            s
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn producer_loop<D: Driver>(
    driver: &mut D,
    cfg: &mut RunConfig,
    acquire: &mut impl FnMut(&mut D, &mut [u8], &RunConfig) -> AcqRc,
    shared: &Arc<Shared>,
    bytes_per_trace: usize,
    store_mode: bool,
) -> Result<RunStats> {
    let mut active_buf: usize = 0;
    let mut traces_in_flush_batch: usize = 0;
    let mut total_traces_captured: u64 = 0;

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        if cfg.n_traces != 0 && total_traces_captured >= cfg.n_traces {
            break;
        }

        let rc = {
            let mut buf = shared.buffers[active_buf]
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let start = traces_in_flush_batch.saturating_mul(bytes_per_trace);
            let end = start.saturating_add(bytes_per_trace);
            let dst = &mut buf[start..end];
            acquire(driver, dst, cfg)
        };

        if rc == ACQ_OK {
            total_traces_captured = total_traces_captured.saturating_add(1);
            traces_in_flush_batch = traces_in_flush_batch.saturating_add(1);
        } else if is_soft_miss(rc) {
            warn!(rc, "soft miss, retrying without advancing counters");
            continue;
        } else {
            error!(rc, "hard acquisition failure, attempting reconnect");
            thread::sleep(HARD_FAILURE_BACKOFF);
            match driver.reconnect() {
                Ok(()) => {
                    // Unlike a soft miss, a hard failure's attempt is not retried: by
                    // the time the transport is back up the trigger window for this
                    // slot is gone. It still counts against the target trace count, so
                    // the run ends up one trace short of `cfg.n_traces` rather than
                    // looping forever trying to make up the loss.
                    info!("reconnect succeeded, slot lost, continuing with next attempt");
                    total_traces_captured = total_traces_captured.saturating_add(1);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "reconnect failed, cancelling run");
                    shared.stop.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }

        if traces_in_flush_batch == cfg.n_flush_traces {
            if store_mode {
                handoff(shared, active_buf);
                if shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                active_buf = if active_buf == 0 { 1 } else { 0 };
            } else {
                thread::sleep(NO_STORE_THROTTLE);
            }
            traces_in_flush_batch = 0;
        }
    }

    // Tail flush: the producer itself writes any partial batch, not the writer, to
    // avoid synchronizing with the writer on the very last slice.
    if store_mode && traces_in_flush_batch > 0 {
        if let Some(output) = &shared.output {
            let buf = shared.buffers[active_buf]
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let tail_bytes = traces_in_flush_batch.saturating_mul(bytes_per_trace);
            let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
            out.write_batch(&buf[..tail_bytes])?;
            let tail_traces = traces_in_flush_batch as u64;
            out.account_traces_written(tail_traces);
            drop(out);
            drop(buf);

            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.total_traces_written = state.total_traces_written.saturating_add(tail_traces);
        }
    }

    let state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
    Ok(RunStats {
        total_traces_captured,
        total_traces_written: state.total_traces_written,
        handovers_waited: state.handovers_waited,
        handovers_nowait: state.handovers_nowait,
    })
}

/// The hand-off protocol: mark the just-filled `active_buf` ready for the writer,
/// applying backpressure if the previous ready batch has not been drained yet.
fn handoff(shared: &Arc<Shared>, active_buf: usize) {
    let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());

    let had_to_wait = state.ready_batches != 0;
    if had_to_wait {
        state.handovers_waited = state.handovers_waited.saturating_add(1);
    } else {
        state.handovers_nowait = state.handovers_nowait.saturating_add(1);
    }

    while state.ready_batches != 0 && !shared.stop.load(Ordering::SeqCst) {
        state = shared
            .written
            .wait_timeout(state, WAIT_POLL_INTERVAL)
            .unwrap_or_else(|e| e.into_inner())
            .0;
    }

    if shared.stop.load(Ordering::SeqCst) {
        return;
    }

    state.next_write_batch_idx = active_buf;
    state.ready_batches = 1;
    debug!(active_buf, "batch ready for writer");
    shared.can_write.notify_one();
}

fn writer_loop(shared: &Arc<Shared>, batch_bytes: usize, n_flush_traces: u64) {
    loop {
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.ready_batches == 0 && !shared.stop.load(Ordering::SeqCst) {
            state = shared
                .can_write
                .wait_timeout(state, WAIT_POLL_INTERVAL)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }

        if state.ready_batches == 0 && shared.stop.load(Ordering::SeqCst) {
            return;
        }

        let this_idx = state.next_write_batch_idx;
        state.ready_batches = 0;
        drop(state);

        let write_result = (|| -> Result<()> {
            let buf = shared.buffers[this_idx]
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(output) = &shared.output {
                let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
                out.write_batch(&buf[..batch_bytes])?;
                out.account_traces_written(n_flush_traces);
            }
            Ok(())
        })();

        if let Err(e) = write_result {
            error!(error = %e, "writer thread failed, stopping run");
            shared.stop.store(true, Ordering::SeqCst);
            shared.written.notify_all();
            return;
        }

        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.total_traces_written = state.total_traces_written.saturating_add(n_flush_traces);
        shared.written.notify_all();
        drop(state);
    }
}

fn install_signal_handler(stop: &Arc<AtomicBool>) {
    let stop = Arc::clone(stop);
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("stop signal received");
        stop.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install signal handler, Ctrl-C will not cleanly cancel a run");
    }
}
