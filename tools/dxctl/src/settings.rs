//! Configuration loading
//!
//! A TOML file supplies a full [`ModuleConfig`] (missing keys take their
//! defaults); command-line [`Overrides`] are applied on top.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use dx_module::{ModuleConfig, TimerPolicy};

/// Reads `path`, or returns the default configuration when no file is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ModuleConfig> {
    let Some(path) = path else {
        return Ok(ModuleConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: ModuleConfig =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Parses `once`, `forever` or `times:N`.
pub fn parse_policy(s: &str) -> Result<TimerPolicy, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "once" => Ok(TimerPolicy::Once),
        "forever" => Ok(TimerPolicy::Forever),
        other => other
            .strip_prefix("times:")
            .and_then(|n| n.parse::<u32>().ok())
            .map(TimerPolicy::Times)
            .ok_or_else(|| format!("expected once, forever or times:N, got '{s}'")),
    }
}

#[derive(Debug, Default, Clone, clap::Args)]
pub struct Overrides {
    /// Number of pool workers
    #[arg(long = "pool-size", value_name = "N")]
    pub pool_size: Option<usize>,

    /// Period of each pool worker
    #[arg(long = "period-ms", value_name = "MS")]
    pub period_ms: Option<u64>,

    /// Delay (and period) of the fan-out timer
    #[arg(long = "timer-ms", value_name = "MS")]
    pub timer_ms: Option<u64>,

    /// once, forever or times:N
    #[arg(long = "timer-policy", value_name = "POLICY", value_parser = parse_policy)]
    pub timer_policy: Option<TimerPolicy>,

    #[arg(long = "debounce-ms", value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Sleep injected into the button's threaded handler
    #[arg(long = "simulate-busy", value_name = "MS")]
    pub simulate_busy_ms: Option<u64>,

    /// Disable the LED mirror timer
    #[arg(long = "no-mirror")]
    pub no_mirror: bool,
}

impl Overrides {
    pub fn apply(&self, config: ModuleConfig) -> ModuleConfig {
        ModuleConfig::builder()
            .pool_size(self.pool_size.unwrap_or(config.pool_size))
            .worker_period(ms(self.period_ms.unwrap_or(config.worker_period_ms)))
            .timer(
                ms(self.timer_ms.unwrap_or(config.timer_delay_ms)),
                self.timer_policy.unwrap_or(config.timer_policy),
            )
            .delayed_work(config.delayed_work())
            .debounce(ms(self.debounce_ms.unwrap_or(config.debounce_ms)))
            .simulate_busy(ms(self.simulate_busy_ms.unwrap_or(config.simulate_busy_ms)))
            .led_mirror(config.led_mirror_period().filter(|_| !self.no_mirror))
            .threads(config.tasklet_threads, config.work_threads)
            .irq_name(config.irq_name)
            .build()
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}
