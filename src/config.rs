//! The run configuration (C3): a record built once per run from CLI flags (or from a
//! caller embedding this crate as a library) and treated as read-only for the rest of
//! the run.

use crate::error::{AcqError, Result};

/// Maximum number of channels that may be requested in a single run.
pub const MAX_CHANNELS: usize = 8;

/// Default per-call transport timeout when the caller leaves `timeout_ms` at zero.
pub const DEFAULT_TIMEOUT_MS: u64 = 2500;

/// Sample width on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    /// One byte per sample.
    #[default]
    Byte,
    /// Two bytes per sample.
    Word,
}

impl Coding {
    /// Number of bytes a single sample occupies on the wire for this coding.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
        }
    }
}

impl TryFrom<u8> for Coding {
    type Error = AcqError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Byte),
            1 => Ok(Self::Word),
            other => Err(AcqError::Config(format!(
                "coding must be 0 (BYTE) or 1 (WORD), got {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Coding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Byte => "BYTE",
            Self::Word => "SHORT",
        };
        write!(f, "{s}")
    }
}

/// A record created once per run and thereafter read-only.
#[derive(Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct RunConfig {
    /// Explicit VISA resource string; `None` means auto-detect.
    pub instr_name: Option<String>,
    /// Ordered, unique channel names, at most [`MAX_CHANNELS`].
    pub channels: Vec<String>,
    /// Sample width.
    pub coding: Coding,
    /// Samples per trace per channel. `0` means "auto-detect at init time".
    pub n_samples: usize,
    /// 1-based start index of the visible window, resolved at init when `n_samples`
    /// was auto-detected.
    pub raw_start_idx: usize,
    /// Total traces to capture. `0` means unlimited.
    pub n_traces: u64,
    /// Traces accumulated in RAM per on-disk write. Always `>= 1`.
    pub n_flush_traces: usize,
    /// Output base path; absence means no-store (probe only, discard data).
    pub outfile: Option<String>,
    /// Verbose logging requested.
    pub verbose: bool,
    /// Diagnose-only mode requested.
    pub diagnose: bool,
    /// Per-call transport timeout.
    pub timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            instr_name: None,
            channels: Vec::new(),
            coding: Coding::default(),
            n_samples: 0,
            raw_start_idx: 1,
            n_traces: 0,
            n_flush_traces: 1,
            outfile: None,
            verbose: false,
            diagnose: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RunConfig {
    /// Number of bytes a single sample occupies on the wire.
    #[must_use]
    pub const fn bytes_per_sample(&self) -> usize {
        self.coding.bytes_per_sample()
    }

    /// Add a channel to the list, enforcing uniqueness and the [`MAX_CHANNELS`] cap.
    ///
    /// # Errors
    /// [`AcqError::Config`] if the channel is already present or the cap is reached.
    pub fn add_channel(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AcqError::Config("channel name must not be empty".into()));
        }
        if self.channels.iter().any(|c| c == name) {
            return Err(AcqError::Config(format!("duplicate channel '{name}'")));
        }
        if self.channels.len() >= MAX_CHANNELS {
            return Err(AcqError::Config(format!(
                "at most {MAX_CHANNELS} channels may be requested"
            )));
        }
        self.channels.push(name.to_string());
        Ok(())
    }

    /// Parse and add every element of a comma-separated channel list.
    ///
    /// # Errors
    /// [`AcqError::Config`] under the same conditions as [`Self::add_channel`].
    pub fn add_channels_csv(&mut self, csv: &str) -> Result<()> {
        for part in csv.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            self.add_channel(part)?;
        }
        Ok(())
    }

    /// Finalize the configuration: clamp `n_flush_traces` to at least 1 and default an
    /// empty channel list to `["CHAN1"]`.
    ///
    /// # Errors
    /// [`AcqError::Config`] if validation fails.
    pub fn finalize(&mut self) -> Result<()> {
        if self.n_flush_traces == 0 {
            self.n_flush_traces = 1;
        }
        if self.channels.is_empty() {
            self.channels.push("CHAN1".to_string());
        }
        if self.channels.len() > MAX_CHANNELS {
            return Err(AcqError::Config(format!(
                "at most {MAX_CHANNELS} channels may be requested, got {}",
                self.channels.len()
            )));
        }
        Ok(())
    }

    /// Number of channels in this run.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn coding_try_from_rejects_out_of_range() {
        assert!(Coding::try_from(2).is_err());
        assert_eq!(Coding::try_from(0).unwrap(), Coding::Byte);
        assert_eq!(Coding::try_from(1).unwrap(), Coding::Word);
    }

    #[test]
    fn add_channel_rejects_duplicates_and_caps_at_max() {
        let mut cfg = RunConfig::default();
        cfg.add_channel("CHAN1").unwrap();
        assert!(cfg.add_channel("CHAN1").is_err());
        for i in 2..=MAX_CHANNELS {
            cfg.add_channel(&format!("CHAN{i}")).unwrap();
        }
        assert!(cfg.add_channel("MATH").is_err());
    }

    #[test]
    fn finalize_defaults_empty_channels_to_chan1() {
        let mut cfg = RunConfig::default();
        cfg.finalize().unwrap();
        assert_eq!(cfg.channels, vec!["CHAN1".to_string()]);
    }

    #[test]
    fn finalize_clamps_zero_flush_traces_to_one() {
        let mut cfg = RunConfig {
            n_flush_traces: 0,
            ..RunConfig::default()
        };
        cfg.finalize().unwrap();
        assert_eq!(cfg.n_flush_traces, 1);
    }

    #[test]
    fn add_channels_csv_trims_and_skips_blank() {
        let mut cfg = RunConfig::default();
        cfg.add_channels_csv(" CHAN1 , CHAN2,, MATH ").unwrap();
        assert_eq!(cfg.channels, vec!["CHAN1", "CHAN2", "MATH"]);
    }
}
