use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use dx_module::{SimBoard, Subsystem};
use dx_sync::{msleep, ProcessContext, StopToken};
use dxctl::report::{print_report, status_line};
use dxctl::{load_config, ConsoleLogger, LogLevel, Overrides};
use log::{info, warn};

const STATUS_PERIOD: Duration = Duration::from_secs(1);
const PRESS_HOLD: Duration = Duration::from_millis(30);

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the DX subsystem on a simulated board")]
struct Opts {
    /// TOML file holding a module configuration
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long = "run-for", value_name = "SECS")]
    run_for: Option<u64>,

    /// Press the simulated button periodically
    #[arg(long = "press-every", value_name = "MS")]
    press_every: Option<u64>,

    #[command(flatten)]
    overrides: Overrides,

    #[arg(long = "log-level", value_enum, default_value = "info")]
    log_level: LogLevel,

    #[arg(long = "no-color")]
    no_color: bool,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    ConsoleLogger::install(opts.log_level.into(), !opts.no_color)
        .context("installing logger")?;
    if opts.no_color {
        colored::control::set_override(false);
    }

    let config = opts.overrides.apply(load_config(opts.config.as_deref())?);
    config.validate().context("invalid configuration")?;

    let stop = StopToken::new();
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.request_stop();
        })
        .context("installing Ctrl-C handler")?;
    }

    let ctx = ProcessContext::enter();
    let sim = SimBoard::new();
    let subsystem = Subsystem::init(config, sim.board(), &ctx).context("loading subsystem")?;
    let presser = match opts.press_every {
        Some(ms) => Some(spawn_presser(sim.clone(), Arc::clone(&stop), Duration::from_millis(ms))?),
        None => None,
    };

    println!("{}", "dxctl running, Ctrl-C to stop".bold());
    let deadline = opts.run_for.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let wait = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(STATUS_PERIOD),
            None => STATUS_PERIOD,
        };
        if stop.wait_timeout(&ctx, wait).is_signaled() {
            info!("stop requested");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            stop.request_stop();
            break;
        }
        println!("{}", status_line(&subsystem));
    }

    if let Some(handle) = presser {
        if handle.join().is_err() {
            warn!("button presser panicked");
        }
    }
    let report = subsystem.deinit(&ctx);
    print_report(&report);
    Ok(())
}

fn spawn_presser(
    sim: SimBoard,
    stop: Arc<StopToken>,
    every: Duration,
) -> anyhow::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("presser".into())
        .spawn(move || {
            let ctx = ProcessContext::enter();
            while !stop.wait_timeout(&ctx, every).is_signaled() {
                sim.press();
                msleep(&ctx, PRESS_HOLD);
                sim.release();
            }
        })
        .context("spawning button presser")
}
