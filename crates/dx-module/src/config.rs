//! Subsystem configuration.
//!
//! All intervals are stored in milliseconds so the configuration reads the
//! same in code and in a TOML file (with the `serde` feature).

use std::time::Duration;

use dx_defer::FirePolicy;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How often the fan-out timer fires once armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimerPolicy {
    Once,
    Times(u32),
    Forever,
}

impl From<TimerPolicy> for FirePolicy {
    fn from(policy: TimerPolicy) -> Self {
        match policy {
            TimerPolicy::Once => FirePolicy::Once,
            TimerPolicy::Times(n) => FirePolicy::Times(n),
            TimerPolicy::Forever => FirePolicy::Forever,
        }
    }
}

/// Immutable configuration handed to [`Subsystem::init`](crate::Subsystem::init).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModuleConfig {
    /// Number of pool workers.
    pub pool_size: usize,
    /// Sleep between two cycles of one worker.
    pub worker_period_ms: u64,
    /// Delay before the fan-out timer first fires, and its period.
    pub timer_delay_ms: u64,
    pub timer_policy: TimerPolicy,
    /// Delay of the work item queued by each tasklet run.
    pub delayed_work_ms: u64,
    /// Minimum interval between accepted button edges.
    pub debounce_ms: u64,
    /// Sleep injected into the button's threaded phase; 0 disables it.
    pub simulate_busy_ms: u64,
    /// Period of the LED mirror timer; 0 disables it.
    pub led_mirror_ms: u64,
    pub tasklet_threads: usize,
    pub work_threads: usize,
    /// Name of the button IRQ registration.
    pub irq_name: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            worker_period_ms: 5000,
            timer_delay_ms: 200,
            timer_policy: TimerPolicy::Once,
            delayed_work_ms: 200,
            debounce_ms: 200,
            simulate_busy_ms: 0,
            led_mirror_ms: 100,
            tasklet_threads: 1,
            work_threads: 1,
            irq_name: "dx-button".to_owned(),
        }
    }
}

impl ModuleConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ModuleConfigBuilder {
        ModuleConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        for (field, value) in [
            ("worker_period_ms", self.worker_period_ms),
            ("timer_delay_ms", self.timer_delay_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(field));
            }
        }
        if self.tasklet_threads == 0 {
            return Err(ConfigError::NoThreads("tasklet_threads"));
        }
        if self.work_threads == 0 {
            return Err(ConfigError::NoThreads("work_threads"));
        }
        if self.timer_policy == TimerPolicy::Times(0) {
            return Err(ConfigError::NeverFires);
        }
        Ok(())
    }

    pub fn worker_period(&self) -> Duration {
        Duration::from_millis(self.worker_period_ms)
    }

    pub fn timer_delay(&self) -> Duration {
        Duration::from_millis(self.timer_delay_ms)
    }

    pub fn delayed_work(&self) -> Duration {
        Duration::from_millis(self.delayed_work_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn simulate_busy(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.simulate_busy_ms)).filter(|d| !d.is_zero())
    }

    pub fn led_mirror_period(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.led_mirror_ms)).filter(|d| !d.is_zero())
    }
}

/// Builder for ergonomic module configuration construction.
#[derive(Debug, Default)]
pub struct ModuleConfigBuilder {
    config: ModuleConfig,
}

impl ModuleConfigBuilder {
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn worker_period(mut self, period: Duration) -> Self {
        self.config.worker_period_ms = as_millis(period);
        self
    }

    pub fn timer(mut self, delay: Duration, policy: TimerPolicy) -> Self {
        self.config.timer_delay_ms = as_millis(delay);
        self.config.timer_policy = policy;
        self
    }

    pub fn delayed_work(mut self, delay: Duration) -> Self {
        self.config.delayed_work_ms = as_millis(delay);
        self
    }

    pub fn debounce(mut self, interval: Duration) -> Self {
        self.config.debounce_ms = as_millis(interval);
        self
    }

    pub fn simulate_busy(mut self, delay: Duration) -> Self {
        self.config.simulate_busy_ms = as_millis(delay);
        self
    }

    pub fn led_mirror(mut self, period: Option<Duration>) -> Self {
        self.config.led_mirror_ms = period.map_or(0, as_millis);
        self
    }

    pub fn threads(mut self, tasklet: usize, work: usize) -> Self {
        self.config.tasklet_threads = tasklet;
        self.config.work_threads = work;
        self
    }

    pub fn irq_name(mut self, name: impl Into<String>) -> Self {
        self.config.irq_name = name.into();
        self
    }

    pub fn build(self) -> ModuleConfig {
        self.config
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
