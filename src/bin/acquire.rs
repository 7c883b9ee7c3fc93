//! The `acquire` binary (C9): a thin `clap`-based CLI that builds a `RunConfig` and
//! dispatches to either `diagnose::run` or `Orchestrator::run`.
//!
//! A concrete third-party oscilloscope driver is a separate concern from this crate,
//! so this binary wires up the loopback `LoopbackDriver` by default, which keeps the
//! crate runnable end to end without real hardware. To drive a real instrument,
//! implement `scope_acq::Driver` for your scope and call `scope_acq::Orchestrator::run`
//! with it directly instead of using this binary.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use scope_acq::{default_acquire, Coding, LoopbackDriver, Orchestrator, RunConfig};

/// A continuous acquisition engine for remote digital oscilloscopes over VISA.
#[derive(Parser, Debug)]
#[command(name = "acquire", version, about)]
struct Cli {
    /// Output base path (timestamp suffixed). Absent means no-store.
    #[arg(short, long = "out", value_name = "BASE")]
    out: Option<String>,

    /// VISA resource string. Absent means auto-detect.
    #[arg(short, long = "instrument", value_name = "VISA")]
    instrument: Option<String>,

    /// Target trace count. 0 = unlimited.
    #[arg(short, long = "ntraces", default_value_t = 0)]
    ntraces: u64,

    /// Traces per flush batch.
    #[arg(short, long = "batch", default_value_t = 1)]
    batch: usize,

    /// Sample coding: 0 = BYTE, 1 = WORD.
    #[arg(short = 'w', long = "coding", default_value_t = 0)]
    coding: u8,

    /// Samples per channel. 0 = auto-detect.
    #[arg(short = 's', long = "nsamples", default_value_t = 0)]
    nsamples: usize,

    /// Add one channel. Repeatable.
    #[arg(short = 'c', long = "chan", value_name = "NAME")]
    chan: Vec<String>,

    /// Comma-separated channel list.
    #[arg(long = "channels", value_name = "LIST")]
    channels: Option<String>,

    /// Enter diagnose mode and exit.
    #[arg(long)]
    diagnose: bool,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scope_acq={default_level},acquire={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_config(cli: &Cli) -> Result<RunConfig, scope_acq::AcqError> {
    let mut cfg = RunConfig {
        instr_name: cli.instrument.clone(),
        coding: Coding::try_from(cli.coding)?,
        n_samples: cli.nsamples,
        n_traces: cli.ntraces,
        n_flush_traces: cli.batch,
        outfile: cli.out.clone(),
        verbose: cli.verbose,
        diagnose: cli.diagnose,
        ..RunConfig::default()
    };

    for chan in &cli.chan {
        cfg.add_channel(chan)?;
    }
    if let Some(csv) = &cli.channels {
        cfg.add_channels_csv(csv)?;
    }
    cfg.finalize()?;
    Ok(cfg)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match build_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let driver = LoopbackDriver::default();

    let result = if cfg.diagnose {
        scope_acq::diagnose::run(driver, cfg)
    } else {
        Orchestrator::run(driver, cfg, default_acquire).map(|stats| {
            tracing::info!(
                captured = stats.total_traces_captured,
                written = stats.total_traces_written,
                "run complete"
            );
        })
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("acquisition failed: {e}");
            tracing::error!(error = %e, "acquisition failed");
            ExitCode::FAILURE
        }
    }
}
