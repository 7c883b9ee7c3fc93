//! Output files (C6): the raw binary trace file and its companion UTF-8 `key=value`
//! log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::RunConfig;
use crate::error::Result;

/// Unix mode bits the binary/log files are created with (owner rw, group/other r).
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// Timestamp format used for `acq_start_time`/`acquisition_end_time`.
const LOG_TIME_FORMAT: &str = "%Y.%m.%d-%H:%M:%S";

/// The two sibling output files for a store-mode run, plus the running trace count
/// used to write the log trailer.
#[allow(clippy::module_name_repetitions)]
pub struct OutputFiles {
    bin: BufWriter<File>,
    log: File,
    ntraces_written: u64,
}

impl OutputFiles {
    /// Open `<base>_<unix_ts>.bin` and `<base>_<unix_ts>.log`, write the log header,
    /// and invoke `dump_log` into the log file.
    ///
    /// # Errors
    /// [`crate::error::AcqError::Io`] if either file could not be created.
    pub fn create(
        base: &str,
        cfg: &RunConfig,
        dump_log: impl FnOnce(&mut dyn Write) -> Result<()>,
    ) -> Result<Self> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let bin_path = format!("{base}_{ts}.bin");
        let log_path = format!("{base}_{ts}.log");

        let bin_file = open_output(&bin_path)?;
        let mut log_file = open_output(&log_path)?;

        write_header(&mut log_file, cfg)?;
        // `dump_log` supplies the IDN, per-channel, and waveform-preamble fields that
        // complete the header.
        dump_log(&mut log_file)?;
        log_file.flush()?;

        info!(bin_path, log_path, "opened output files");

        Ok(Self {
            bin: BufWriter::new(bin_file),
            log: log_file,
            ntraces_written: 0,
        })
    }

    /// Append `bytes` (one flush batch, or the final partial tail) to the binary file.
    ///
    /// # Errors
    /// [`crate::error::AcqError::Io`] on write failure.
    pub fn write_batch(&mut self, bytes: &[u8]) -> Result<()> {
        write_all_retrying(&mut self.bin, bytes)?;
        Ok(())
    }

    /// Record that `n` more traces were durably written, for the log trailer.
    pub fn account_traces_written(&mut self, n: u64) {
        self.ntraces_written = self.ntraces_written.saturating_add(n);
    }

    /// Flush the binary file and write the log trailer (`acquisition_end_time`,
    /// `ntraces_written`).
    ///
    /// # Errors
    /// [`crate::error::AcqError::Io`] on flush/write failure.
    pub fn finish(mut self) -> Result<()> {
        self.bin.flush()?;
        let end_time: DateTime<Utc> = Utc::now();
        writeln!(
            self.log,
            "acquisition_end_time={}",
            end_time.format(LOG_TIME_FORMAT)
        )?;
        writeln!(self.log, "ntraces_written={}", self.ntraces_written)?;
        self.log.flush()?;
        Ok(())
    }
}

fn open_output(path: &str) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(OUTPUT_MODE);
    Ok(opts.open(path)?)
}

fn write_header(log: &mut File, cfg: &RunConfig) -> Result<()> {
    let start_time: DateTime<Utc> = Utc::now();
    writeln!(log, "acq_start_time={}", start_time.format(LOG_TIME_FORMAT))?;
    writeln!(
        log,
        "instrument_name={}",
        cfg.instr_name.as_deref().unwrap_or("<auto>")
    )?;
    writeln!(log, "channels={}", cfg.channels.join(","))?;
    writeln!(log, "coding={}", cfg.coding)?;
    writeln!(log, "nsamples={}", cfg.n_samples)?;
    writeln!(log, "ntraces_per_flush={}", cfg.n_flush_traces)?;
    Ok(())
}

/// Retry loop handling partial writes and interrupted syscalls, mirroring the
/// orchestrator's writer-thread write path.
fn write_all_retrying(w: &mut impl Write, mut bytes: &[u8]) -> std::io::Result<()> {
    while !bytes.is_empty() {
        match w.write(bytes) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write returned 0 bytes",
                ))
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod unit {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn create_write_finish_round_trips_header_body_and_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run").to_string_lossy().to_string();

        let mut cfg = RunConfig::default();
        cfg.add_channel("CHAN1").unwrap();
        cfg.n_samples = 10;
        cfg.n_flush_traces = 2;
        cfg.finalize().unwrap();

        let mut out = OutputFiles::create(&base, &cfg, |w| {
            writeln!(w, "IDN=ACME,MODEL 1000,SN0001,1.0").map_err(Into::into)
        })
        .unwrap();

        let batch = vec![1u8, 2, 3, 4];
        out.write_batch(&batch).unwrap();
        out.account_traces_written(2);
        out.finish().unwrap();

        let mut bin_paths: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "bin"))
            .collect();
        assert_eq!(bin_paths.len(), 1);
        let mut bin_contents = Vec::new();
        File::open(bin_paths.pop().unwrap())
            .unwrap()
            .read_to_end(&mut bin_contents)
            .unwrap();
        assert_eq!(bin_contents, batch);

        let log_path = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|e| e == "log"))
            .unwrap();
        let log_contents = std::fs::read_to_string(log_path).unwrap();
        assert!(log_contents.contains("channels=CHAN1"));
        assert!(log_contents.contains("nsamples=10"));
        assert!(log_contents.contains("IDN=ACME,MODEL 1000,SN0001,1.0"));
        assert!(log_contents.contains("ntraces_written=2"));
        assert!(log_contents.contains("acquisition_end_time="));
    }
}
