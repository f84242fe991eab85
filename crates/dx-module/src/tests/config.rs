use std::time::Duration;

use dx_defer::FirePolicy;

use crate::config::{ModuleConfig, TimerPolicy};
use crate::error::ConfigError;

#[test]
fn default_matches_reference_sizing() {
    let config = ModuleConfig::default();

    assert_eq!(config.pool_size, 5);
    assert_eq!(config.worker_period(), Duration::from_millis(5000));
    assert_eq!(config.timer_delay(), Duration::from_millis(200));
    assert_eq!(config.timer_policy, TimerPolicy::Once);
    assert_eq!(config.delayed_work(), Duration::from_millis(200));
    assert_eq!(config.debounce(), Duration::from_millis(200));
    assert_eq!(config.simulate_busy(), None);
    assert_eq!(config.led_mirror_period(), Some(Duration::from_millis(100)));
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn builder_overrides_fields() {
    let config = ModuleConfig::builder()
        .pool_size(3)
        .worker_period(Duration::from_millis(250))
        .timer(Duration::from_millis(50), TimerPolicy::Times(5))
        .delayed_work(Duration::from_millis(75))
        .debounce(Duration::ZERO)
        .simulate_busy(Duration::from_secs(2))
        .led_mirror(None)
        .threads(2, 3)
        .irq_name("gpio-button")
        .build();

    assert_eq!(config.pool_size, 3);
    assert_eq!(config.worker_period_ms, 250);
    assert_eq!(config.timer_delay_ms, 50);
    assert_eq!(config.timer_policy, TimerPolicy::Times(5));
    assert_eq!(config.delayed_work_ms, 75);
    assert_eq!(config.debounce_ms, 0);
    assert_eq!(config.simulate_busy(), Some(Duration::from_secs(2)));
    assert_eq!(config.led_mirror_period(), None);
    assert_eq!((config.tasklet_threads, config.work_threads), (2, 3));
    assert_eq!(config.irq_name, "gpio-button");
}

#[test]
fn validation_rejects_unusable_values() {
    let cases = [
        (ModuleConfig::builder().pool_size(0).build(), ConfigError::EmptyPool),
        (
            ModuleConfig::builder().worker_period(Duration::ZERO).build(),
            ConfigError::ZeroInterval("worker_period_ms"),
        ),
        (
            ModuleConfig::builder()
                .timer(Duration::ZERO, TimerPolicy::Once)
                .build(),
            ConfigError::ZeroInterval("timer_delay_ms"),
        ),
        (
            ModuleConfig::builder().threads(0, 1).build(),
            ConfigError::NoThreads("tasklet_threads"),
        ),
        (
            ModuleConfig::builder().threads(1, 0).build(),
            ConfigError::NoThreads("work_threads"),
        ),
        (
            ModuleConfig::builder()
                .timer(Duration::from_millis(10), TimerPolicy::Times(0))
                .build(),
            ConfigError::NeverFires,
        ),
    ];

    for (config, expected) in cases {
        assert_eq!(config.validate(), Err(expected));
    }
}

#[test]
fn timer_policy_maps_onto_fire_policy() {
    assert_eq!(FirePolicy::from(TimerPolicy::Once), FirePolicy::Once);
    assert_eq!(FirePolicy::from(TimerPolicy::Times(4)), FirePolicy::Times(4));
    assert_eq!(FirePolicy::from(TimerPolicy::Forever), FirePolicy::Forever);
}
