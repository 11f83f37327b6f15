/*!
 * Scheduler Configuration
 *
 * Runtime configuration with defaults, builder setters, and environment
 * overrides:
 * - RMS_TICK_US: host tick resolution in microseconds (default: 1000)
 * - RMS_RT_PRIORITY: real-time priority used on promotion (default: 99)
 * - RMS_INITIAL_RELEASE: `deferred` or `immediate` (default: deferred)
 */

use crate::core::time;
use crate::core::types::Millis;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// When a newly registered task is first released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialRelease {
    /// At the first period boundary after registration
    #[default]
    Deferred,
    /// Ready as soon as it is registered
    Immediate,
}

impl FromStr for InitialRelease {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deferred" | "defer" => Ok(Self::Deferred),
            "immediate" | "now" => Ok(Self::Immediate),
            _ => Err(format!(
                "Invalid initial release '{}'. Valid: deferred, immediate",
                s
            )),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Host tick; periods and budgets are rounded up to whole ticks
    pub tick: Duration,
    /// `SCHED_FIFO` priority used by `OsPriorityController::from_config`
    pub rt_priority: i32,
    pub initial_release: InitialRelease,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1),
            rt_priority: 99,
            initial_release: InitialRelease::Deferred,
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by any valid `RMS_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(micros) = env_parse::<u64>("RMS_TICK_US") {
            if micros == 0 {
                warn!("RMS_TICK_US must be positive; keeping default tick");
            } else {
                config.tick = Duration::from_micros(micros);
            }
        }
        if let Some(priority) = env_parse::<i32>("RMS_RT_PRIORITY") {
            config.rt_priority = priority.clamp(1, 99);
        }
        if let Some(release) = env_parse::<InitialRelease>("RMS_INITIAL_RELEASE") {
            config.initial_release = release;
        }

        config
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_rt_priority(mut self, rt_priority: i32) -> Self {
        self.rt_priority = rt_priority;
        self
    }

    pub fn with_initial_release(mut self, initial_release: InitialRelease) -> Self {
        self.initial_release = initial_release;
        self
    }

    /// Millisecond value at host tick resolution
    #[inline]
    pub fn quantize(&self, ms: Millis) -> Duration {
        time::quantize(ms, self.tick)
    }
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring invalid configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in ["RMS_TICK_US", "RMS_RT_PRIORITY", "RMS_INITIAL_RELEASE"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick, Duration::from_millis(1));
        assert_eq!(config.rt_priority, 99);
        assert_eq!(config.initial_release, InitialRelease::Deferred);
    }

    #[test]
    fn test_builder_and_quantize() {
        let config = SchedulerConfig::default()
            .with_tick(Duration::from_millis(10))
            .with_initial_release(InitialRelease::Immediate);
        assert_eq!(config.quantize(25), Duration::from_millis(30));
        assert_eq!(config.initial_release, InitialRelease::Immediate);
    }

    #[test]
    fn test_initial_release_parse() {
        assert_eq!(
            "Immediate".parse::<InitialRelease>(),
            Ok(InitialRelease::Immediate)
        );
        assert_eq!(
            "deferred".parse::<InitialRelease>(),
            Ok(InitialRelease::Deferred)
        );
        assert!("later".parse::<InitialRelease>().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("RMS_TICK_US", "250");
        std::env::set_var("RMS_RT_PRIORITY", "150");
        std::env::set_var("RMS_INITIAL_RELEASE", "immediate");

        let config = SchedulerConfig::from_env();
        assert_eq!(config.tick, Duration::from_micros(250));
        assert_eq!(config.rt_priority, 99);
        assert_eq!(config.initial_release, InitialRelease::Immediate);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        std::env::set_var("RMS_TICK_US", "fast");
        std::env::set_var("RMS_INITIAL_RELEASE", "sometime");

        assert_eq!(SchedulerConfig::from_env(), SchedulerConfig::default());
        clear_env();
    }
}
