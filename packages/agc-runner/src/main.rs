//! Reference host loop for `agc-core`: loads a rope image (and optional
//! core-dump), paces the engine in real time on a worker thread, and relays
//! a periodic channel snapshot back to the main thread for logging.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{Receiver, Sender};

use agc_core::config::EngineConfig;
use agc_core::dump;
use agc_core::engine::exec::Engine;
use agc_core::error::{DumpLoadError, RomLoadError};
use agc_core::pacing::{Pacer, RealSleeper, MCT_NANOS};
use agc_core::rom;

/// Loads a rope image and runs the AGC core in real time.
#[derive(Parser, Debug)]
#[command(name = "agc-runner")]
#[command(version)]
#[command(about = "Loads a rope image and runs the AGC core in real time")]
struct Cli {
    /// Rope (fixed-memory) image to boot from.
    rope: PathBuf,

    /// Optional core-dump to resume erasable memory and runtime state from.
    #[arg(long)]
    dump: Option<PathBuf>,

    /// When loading --dump, only restore erasable memory — the bank-0
    /// register file is left as the rope's boot sequence set it.
    #[arg(long)]
    erasable_only: bool,

    /// Suppress GOJAM on alarm trigger. Alarms still latch their ch 77 bit.
    #[arg(long)]
    inhibit_alarms: bool,

    /// Don't log a line every time an alarm triggers.
    #[arg(long)]
    quiet_alarms: bool,

    /// Preload the erasable cells the Sunburst 37 rope expects at boot.
    #[arg(long)]
    sunburst37: bool,

    /// Force fixed-memory parity checking even if the rope carries no
    /// parity bits (the loader auto-enables it when it finds any).
    #[arg(long)]
    check_parity: bool,

    /// Machine cycles advanced per pacing batch.
    #[arg(long, default_value_t = 256)]
    batch: u32,

    /// Stop after this many machine cycles instead of running forever.
    #[arg(long)]
    cycles: Option<u64>,
}

/// The channels a ground operator would actually watch, snapshotted once
/// per batch and sent from the engine thread to the logging thread.
#[derive(Debug, Clone, Copy)]
struct ChannelSnapshot {
    cycle: u64,
    ch13: u16,
    ch77: u16,
    ch163: u16,
}

enum EngineEvent {
    Snapshot(ChannelSnapshot),
    Finished { cycles: u64 },
}

fn main() -> std::process::ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let rope_bytes = match std::fs::read(&cli.rope) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::error!("{}", RomLoadError::NotFound(e));
            return std::process::ExitCode::from(2);
        }
        Err(e) => {
            log::error!("{}", RomLoadError::Read(e));
            return std::process::ExitCode::from(2);
        }
    };

    let config = EngineConfig {
        inhibit_alarms: cli.inhibit_alarms,
        show_alarms: !cli.quiet_alarms,
        initialize_sunburst_37: cli.sunburst37,
        check_parity: cli.check_parity,
    };
    let mut engine = Engine::new(config);

    let any_parity = match rom::load_rope(&mut engine.mem, &rope_bytes) {
        Ok(parity) => parity,
        Err(e) => {
            log::error!("{e}");
            return std::process::ExitCode::from(2);
        }
    };
    if any_parity && !engine.config.check_parity {
        log::info!("rope image carries parity bits, enabling parity checking");
        engine.config.check_parity = true;
        engine.mem.check_parity = true;
    }

    if let Some(dump_path) = &cli.dump {
        let dump_text = match std::fs::read_to_string(dump_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!("{}", DumpLoadError::NotFound(e));
                return std::process::ExitCode::from(2);
            }
            Err(e) => {
                log::error!("{}", DumpLoadError::Read(e));
                return std::process::ExitCode::from(2);
            }
        };
        let parsed = match dump::parse_dump(&dump_text) {
            Ok(d) => d,
            Err(e) => {
                log::error!("{e}");
                return std::process::ExitCode::from(2);
            }
        };
        dump::apply_to_memory(&mut engine.mem, &parsed, cli.erasable_only);
        log::info!("resumed from core-dump {}", dump_path.display());
    }

    engine.gojam_reset();
    log::info!(
        "boot: rope={} ({} bytes), batch={}, inhibit_alarms={}",
        cli.rope.display(),
        rope_bytes.len(),
        cli.batch,
        cli.inhibit_alarms,
    );

    let (tx, rx): (Sender<EngineEvent>, Receiver<EngineEvent>) = crossbeam_channel::unbounded();
    let batch = cli.batch;
    let cycle_budget = cli.cycles;
    let worker = thread::spawn(move || run_engine(engine, batch, cycle_budget, tx));

    for event in rx.iter() {
        match event {
            EngineEvent::Snapshot(snap) => {
                log::debug!(
                    "cycle {:>12} ch13={:06o} ch77={:06o} ch163={:06o}",
                    snap.cycle, snap.ch13, snap.ch77, snap.ch163,
                );
            }
            EngineEvent::Finished { cycles } => {
                log::info!("stopped after {cycles} machine cycles");
            }
        }
    }

    worker.join().expect("engine thread panicked");
    std::process::ExitCode::SUCCESS
}

/// Drives `engine` at (approximately) real time, reporting a channel
/// snapshot once per batch and a final notice when `cycle_budget` (if any)
/// runs out. Doesn't separately track step()'s own CPU cost against the
/// pacing budget — at ~85kHz the batch's compute time is negligible next to
/// the real-time sleep it earns, so charging it zero overhead is adequate
/// for a reference loop.
fn run_engine(mut engine: Engine, batch: u32, cycle_budget: Option<u64>, tx: Sender<EngineEvent>) {
    let mut pacer = Pacer::new(RealSleeper, batch);
    log::debug!("batch duration budget: {} ns", MCT_NANOS * batch as u64);

    loop {
        if let Some(budget) = cycle_budget {
            if engine.cycle_counter() >= budget {
                break;
            }
        }

        pacer.run_batch(&mut engine, Duration::ZERO);

        let snapshot = ChannelSnapshot {
            cycle: engine.cycle_counter(),
            ch13: engine.mem.channels[0o13],
            ch77: engine.mem.channels[0o77],
            ch163: engine.mem.channels[0o163],
        };
        if tx.send(EngineEvent::Snapshot(snapshot)).is_err() {
            return;
        }
    }

    let _ = tx.send(EngineEvent::Finished { cycles: engine.cycle_counter() });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_rope_path_and_flags() {
        let cli = Cli::parse_from([
            "agc-runner",
            "rope.bin",
            "--inhibit-alarms",
            "--batch",
            "64",
            "--cycles",
            "1000",
        ]);
        assert_eq!(cli.rope, PathBuf::from("rope.bin"));
        assert!(cli.inhibit_alarms);
        assert_eq!(cli.batch, 64);
        assert_eq!(cli.cycles, Some(1000));
    }

    #[test]
    fn batch_defaults_to_256() {
        let cli = Cli::parse_from(["agc-runner", "rope.bin"]);
        assert_eq!(cli.batch, 256);
        assert!(cli.dump.is_none());
    }
}
