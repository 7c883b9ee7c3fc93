//! The memory planner (C4): computes batch sizes from a [`RunConfig`] with
//! overflow-checked arithmetic and enforces the 50%-of-RAM cap before any allocation is
//! made.

use crate::config::RunConfig;
use crate::error::{AcqError, Result};

/// Physical RAM assumed when detection fails.
const FALLBACK_RAM_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// The sizes the orchestrator needs before it allocates the double buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct MemoryPlan {
    /// Bytes occupied by one trace across all channels.
    pub bytes_per_trace: usize,
    /// Bytes occupied by one flush batch (`bytes_per_trace * n_flush_traces`).
    pub bytes_per_flush_batch: usize,
}

impl MemoryPlan {
    /// Compute the plan for `cfg`, rejecting configurations that would overflow
    /// `usize` or whose batch would exceed 50% of detected physical RAM.
    ///
    /// # Errors
    /// [`AcqError::Config`] on overflow or RAM-cap violation.
    pub fn compute(cfg: &RunConfig) -> Result<Self> {
        Self::compute_with_ram(cfg, detect_ram_bytes())
    }

    /// As [`Self::compute`], but against an explicit RAM size instead of the
    /// host's detected physical RAM. Exposed so the 50%-of-RAM cap can be
    /// exercised deterministically without depending on the machine running the
    /// tests.
    ///
    /// # Errors
    /// [`AcqError::Config`] on overflow or RAM-cap violation.
    pub fn compute_with_ram(cfg: &RunConfig, ram_bytes: u64) -> Result<Self> {
        let bytes_per_sample = cfg.bytes_per_sample();
        let bytes_per_trace = cfg
            .n_samples
            .checked_mul(cfg.n_channels())
            .and_then(|v| v.checked_mul(bytes_per_sample))
            .ok_or_else(|| {
                AcqError::Config(
                    "n_samples * n_channels * bytes_per_sample overflows usize".into(),
                )
            })?;

        let bytes_per_flush_batch = bytes_per_trace
            .checked_mul(cfg.n_flush_traces)
            .ok_or_else(|| {
                AcqError::Config("bytes_per_trace * n_flush_traces overflows usize".into())
            })?;

        let cap = ram_bytes.checked_div(2).unwrap_or(0);
        if bytes_per_flush_batch as u64 > cap {
            return Err(AcqError::Config(format!(
                "flush batch of {:.1} MiB exceeds 50% of detected RAM ({:.1} MiB); \
                 reduce --batch or --nsamples",
                mib(bytes_per_flush_batch as u64),
                mib(cap),
            )));
        }

        Ok(Self {
            bytes_per_trace,
            bytes_per_flush_batch,
        })
    }
}

/// Render a byte count as MiB for a log/error message. `u64 as f64` loses precision
/// above 2^53 bytes (16 petabytes); nothing this crate allocates gets remotely close,
/// and the value is for human display only, never compared or round-tripped.
#[allow(clippy::cast_precision_loss)]
fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Detect physical RAM in bytes, falling back to [`FALLBACK_RAM_BYTES`] when detection
/// is unavailable or fails to parse.
fn detect_ram_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Some(bytes) = read_meminfo_total() {
            return bytes;
        }
    }
    FALLBACK_RAM_BYTES
}

#[cfg(target_os = "linux")]
fn read_meminfo_total() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kib: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return kib.checked_mul(1024);
        }
    }
    None
}

#[cfg(test)]
mod unit {
    use super::*;

    fn cfg(n_samples: usize, n_channels: usize, n_flush: usize) -> RunConfig {
        let mut c = RunConfig {
            n_samples,
            n_flush_traces: n_flush,
            ..RunConfig::default()
        };
        for i in 0..n_channels {
            c.add_channel(&format!("CHAN{}", i + 1)).unwrap();
        }
        c
    }

    #[test]
    fn computes_expected_sizes_for_byte_coding() {
        let c = cfg(1000, 2, 4);
        let plan = MemoryPlan::compute(&c).unwrap();
        assert_eq!(plan.bytes_per_trace, 2000);
        assert_eq!(plan.bytes_per_flush_batch, 8000);
    }

    #[test]
    fn rejects_multiplication_overflow() {
        let c = cfg(usize::MAX / 2, 8, 1024);
        assert!(matches!(
            MemoryPlan::compute(&c),
            Err(AcqError::Config(_))
        ));
    }

    #[test]
    fn rejects_batch_exceeding_half_of_fallback_ram_when_detection_unavailable() {
        // 4 GiB fallback / 2 = 2 GiB cap; ask for a batch far beyond that.
        let c = cfg(1_000_000_000, 8, 8);
        assert!(matches!(
            MemoryPlan::compute(&c),
            Err(AcqError::Config(_))
        ));
    }

    #[test]
    fn rejects_batch_exceeding_half_of_an_explicit_ram_bound() {
        let c = cfg(1_048_576, 1, 1);
        let one_mib = 1024 * 1024;
        assert!(matches!(
            MemoryPlan::compute_with_ram(&c, one_mib),
            Err(AcqError::Config(_))
        ));
    }

    #[test]
    fn accepts_batch_within_half_of_an_explicit_ram_bound() {
        let c = cfg(1000, 1, 1);
        let one_mib = 1024 * 1024;
        assert!(MemoryPlan::compute_with_ram(&c, one_mib).is_ok());
    }
}
