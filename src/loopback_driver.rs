//! A loopback [`Driver`] implementation that generates synthetic trace data instead of
//! talking to real hardware. A concrete VISA-backed scope driver is a separate concern
//! left to callers of this crate, so the shipped `acquire` binary wires this up by
//! default, which keeps the crate runnable and testable end to end without an
//! instrument attached.

use std::io::Write;

use crate::config::RunConfig;
use crate::driver::Driver;
use crate::error::Result;

/// A driver that never opens a transport session; it fabricates a deterministic
/// sawtooth waveform so an end-to-end run can be observed and its output files
/// inspected without hardware.
#[derive(Debug, Default)]
pub struct LoopbackDriver {
    sample_counter: u64,
}

impl Driver for LoopbackDriver {
    fn init(&mut self, cfg: &mut RunConfig) -> Result<()> {
        if cfg.n_samples == 0 {
            cfg.n_samples = 1000;
            cfg.raw_start_idx = 1;
        }
        if cfg.channels.is_empty() {
            cfg.channels.push("CHAN1".to_string());
        }
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
        for (i, byte) in dst.iter_mut().enumerate() {
            let sample = self.sample_counter.wrapping_add(i as u64);
            *byte = u8::try_from(sample % 256).unwrap_or(0);
        }
        self.sample_counter = self.sample_counter.wrapping_add(1);
        Ok(())
    }

    fn list_displayed_channels(&mut self) -> Result<Vec<String>> {
        Ok(vec!["CHAN1".to_string()])
    }

    fn dump_log(&mut self, out: &mut dyn Write, cfg: &RunConfig) -> Result<()> {
        writeln!(out, "IDN=LOOPBACK,MODEL SIM1,SN000000,0.1")?;
        writeln!(out, "n_channels={}", cfg.n_channels())?;
        writeln!(out, "sample_rate_hz=1000000")?;
        writeln!(out, "waveform_mode=RAW")?;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn init_defaults_nsamples_and_channels_when_unset() {
        let mut driver = LoopbackDriver::default();
        let mut cfg = RunConfig::default();
        driver.init(&mut cfg).unwrap();
        assert_eq!(cfg.n_samples, 1000);
        assert_eq!(cfg.channels, vec!["CHAN1".to_string()]);
    }

    #[test]
    fn read_trace_fills_every_byte_and_advances_each_call() {
        let mut driver = LoopbackDriver::default();
        let cfg = RunConfig::default();
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        driver.read_trace(&mut first, &cfg).unwrap();
        driver.read_trace(&mut second, &cfg).unwrap();
        assert_ne!(first, second);
    }
}
