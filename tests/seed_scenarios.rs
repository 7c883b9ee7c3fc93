//! Integration tests for the seed scenarios: full `Orchestrator::run` executions
//! against a stub [`Driver`] whose `acquire` routine is scripted per scenario, with
//! assertions on the resulting binary/log files.

use std::fs::File;
use std::io::{Read as _, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use scope_acq::driver::{ACQ_ERR_TRIGGER_TIMEOUT, ACQ_OK};
use scope_acq::{Coding, Driver, MemoryPlan, Orchestrator, Result, RunConfig};

/// A driver with no real transport: every capability but `read_trace`/`reconnect` is a
/// trivial success, since the scenarios below drive capture outcomes entirely through
/// the `acquire` closure passed to `Orchestrator::run`.
#[derive(Default)]
struct StubDriver {
    reconnect_calls: Arc<AtomicU32>,
}

impl Driver for StubDriver {
    fn init(&mut self, _cfg: &mut RunConfig) -> Result<()> {
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn arm(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn force_trigger(&mut self) -> Result<()> {
        Ok(())
    }

    fn check_if_armed(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn check_if_triggered(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn read_trace(&mut self, dst: &mut [u8], _cfg: &RunConfig) -> Result<()> {
        dst.fill(0xAB);
        Ok(())
    }

    fn list_displayed_channels(&mut self) -> Result<Vec<String>> {
        Ok(vec!["CHAN1".to_string()])
    }

    fn dump_log(&mut self, out: &mut dyn Write, _cfg: &RunConfig) -> Result<()> {
        writeln!(out, "IDN=STUB,MODEL T1000,SN00001,0.0").map_err(Into::into)
    }

    fn reconnect(&mut self) -> Result<()> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn bin_file_len(dir: &Path) -> u64 {
    let path = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|e| e == "bin"))
        .expect("a .bin file was created");
    File::open(path).unwrap().metadata().unwrap().len()
}

fn log_contents(dir: &Path) -> String {
    let path = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|e| e == "log"))
        .expect("a .log file was created");
    let mut s = String::new();
    File::open(path).unwrap().read_to_string(&mut s).unwrap();
    s
}

fn base_cfg(channels: &[&str], coding: Coding, n_samples: usize, out: &Path) -> RunConfig {
    let mut cfg = RunConfig {
        coding,
        n_samples,
        outfile: Some(out.join("run").to_string_lossy().to_string()),
        ..RunConfig::default()
    };
    for c in channels {
        cfg.add_channel(c).unwrap();
    }
    cfg
}

/// S1: `-n 4 -b 2 -s 100 -c CHAN1 -w 0 -o out`.
#[test]
fn s1_single_channel_byte_coding_writes_every_trace() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_cfg(&["CHAN1"], Coding::Byte, 100, dir.path());
    cfg.n_traces = 4;
    cfg.n_flush_traces = 2;
    cfg.finalize().unwrap();

    let bytes_per_trace = cfg.n_samples * cfg.n_channels() * cfg.bytes_per_sample();
    assert_eq!(bytes_per_trace, 100);

    let stats = Orchestrator::run(StubDriver::default(), cfg, |_d, dst, _cfg| {
        dst.fill(0x01);
        ACQ_OK
    })
    .unwrap();

    assert_eq!(stats.total_traces_captured, 4);
    assert_eq!(stats.total_traces_written, 4);
    assert_eq!(bin_file_len(dir.path()), 4 * bytes_per_trace as u64);

    let log = log_contents(dir.path());
    assert!(log.contains("nsamples=100"));
    assert!(log.contains("ntraces_per_flush=2"));
    assert!(log.contains("channels=CHAN1"));
    assert!(log.contains("ntraces_written=4"));
}

/// S2: `-n 5 -b 2 -s 100 -c CHAN1 -c CHAN2 -w 1 -o out`.
#[test]
fn s2_two_channels_word_coding_flushes_partial_tail_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_cfg(&["CHAN1", "CHAN2"], Coding::Word, 100, dir.path());
    cfg.n_traces = 5;
    cfg.n_flush_traces = 2;
    cfg.finalize().unwrap();

    let bytes_per_trace = cfg.n_samples * cfg.n_channels() * cfg.bytes_per_sample();
    assert_eq!(bytes_per_trace, 400);

    let stats = Orchestrator::run(StubDriver::default(), cfg, |_d, dst, _cfg| {
        dst.fill(0x02);
        ACQ_OK
    })
    .unwrap();

    assert_eq!(stats.total_traces_written, 5);
    assert_eq!(bin_file_len(dir.path()), 2000);

    let log = log_contents(dir.path());
    assert!(log.contains("ntraces_written=5"));
}

/// S3: trigger-timeout soft miss injected on every third attempt, target `-n 10`.
/// Every soft miss is retried in place without consuming a slot, so 10 successes take
/// 15 total attempts and leave 5 skip entries.
#[test]
fn s3_soft_miss_retries_without_consuming_the_target_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_cfg(&["CHAN1"], Coding::Byte, 50, dir.path());
    cfg.n_traces = 10;
    cfg.n_flush_traces = 1;
    cfg.finalize().unwrap();

    let attempts = Arc::new(AtomicU64::new(0));
    let misses = Arc::new(AtomicU64::new(0));
    let attempts_in_closure = Arc::clone(&attempts);
    let misses_in_closure = Arc::clone(&misses);

    let stats = Orchestrator::run(StubDriver::default(), cfg, move |_d, dst, _cfg| {
        let n = attempts_in_closure.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 3 == 0 {
            misses_in_closure.fetch_add(1, Ordering::SeqCst);
            ACQ_ERR_TRIGGER_TIMEOUT
        } else {
            dst.fill(0x03);
            ACQ_OK
        }
    })
    .unwrap();

    assert_eq!(stats.total_traces_captured, 10);
    assert_eq!(attempts.load(Ordering::SeqCst), 15);
    assert_eq!(misses.load(Ordering::SeqCst), 5);
    let bytes_per_trace = 50;
    assert_eq!(bin_file_len(dir.path()), 10 * bytes_per_trace as u64);
}

/// S4: a flush batch that would exceed 50% of a 1 MiB RAM budget is rejected before
/// any allocation, never reaching `Orchestrator::run`.
#[test]
fn s4_oversized_batch_is_rejected_against_a_small_ram_budget() {
    let mut cfg = RunConfig {
        n_samples: 1_048_576,
        n_flush_traces: 2,
        ..RunConfig::default()
    };
    cfg.add_channel("CHAN1").unwrap();
    cfg.finalize().unwrap();

    let one_mib = 1024 * 1024;
    let err = MemoryPlan::compute_with_ram(&cfg, one_mib).unwrap_err();
    assert!(matches!(err, scope_acq::AcqError::Config(_)));
}

/// S5: a run that ends with a partial final batch (here, two full batches of 10 plus
/// a partial of 3) still flushes the partial tail, via the same producer-side tail
/// flush path a mid-batch cancellation would take.
#[test]
fn s5_partial_tail_batch_is_flushed_on_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_cfg(&["CHAN1"], Coding::Byte, 20, dir.path());
    cfg.n_traces = 23;
    cfg.n_flush_traces = 10;
    cfg.finalize().unwrap();

    let bytes_per_trace = 20;
    let stats = Orchestrator::run(StubDriver::default(), cfg, |_d, dst, _cfg| {
        dst.fill(0x05);
        ACQ_OK
    })
    .unwrap();

    assert_eq!(stats.total_traces_written, 23);
    assert_eq!(bin_file_len(dir.path()), 23 * bytes_per_trace as u64);
}

/// S6: a hard driver error on attempt 7 of a 20-trace run, with a successful
/// reconnect. The failed attempt's slot is not retried, so the run ends with 19
/// traces on disk rather than 20.
#[test]
fn s6_hard_failure_mid_run_loses_exactly_one_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_cfg(&["CHAN1"], Coding::Byte, 10, dir.path());
    cfg.n_traces = 20;
    cfg.n_flush_traces = 1;
    cfg.finalize().unwrap();

    let reconnect_calls = Arc::new(AtomicU32::new(0));
    let driver = StubDriver {
        reconnect_calls: Arc::clone(&reconnect_calls),
    };

    let attempts = Arc::new(AtomicU64::new(0));
    let attempts_in_closure = Arc::clone(&attempts);
    const HARD_FAILURE_RC: i32 = -1;

    let stats = Orchestrator::run(driver, cfg, move |_d, dst, _cfg| {
        let n = attempts_in_closure.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 7 {
            HARD_FAILURE_RC
        } else {
            dst.fill(0x06);
            ACQ_OK
        }
    })
    .unwrap();

    assert_eq!(reconnect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.total_traces_captured, 20);
    assert_eq!(stats.total_traces_written, 19);
    let bytes_per_trace = 10;
    assert_eq!(bin_file_len(dir.path()), 19 * bytes_per_trace as u64);
}
