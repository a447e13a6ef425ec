use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::env::{DEFAULT_ATTACK_DURATION, DEFAULT_ATTACK_RATE_PER_SECOND, DEFAULT_ATTACK_TIMEOUT};

const MIN_INTERVAL: Duration = Duration::from_nanos(1);

/// Request rate handed to the attack engine: `freq` hits every `per`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub freq: u32,
    pub per: Duration,
}

impl Rate {
    /// Rate of `freq` requests each second
    pub fn per_second(freq: u32) -> Self {
        Self {
            freq,
            per: Duration::from_secs(1),
        }
    }

    /// Delay between two consecutive hits, `None` if the rate is zero.
    /// Never shorter than one nanosecond.
    pub fn interval(&self) -> Option<Duration> {
        if self.freq == 0 || self.per.is_zero() {
            return None;
        }
        Some((self.per / self.freq).max(MIN_INTERVAL))
    }
}

/// Per-target attack tuning.
///
/// A zero value means "unset": [`AttackOptions::init`] fills it from the
/// defaults when a target is registered, and the merge engine ignores it
/// when it comes from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAttackOptions", into = "RawAttackOptions")]
pub struct AttackOptions {
    duration: Duration,
    rate_per_second: u32,
    timeout: Duration,
    rate: Rate,
}

impl Default for AttackOptions {
    fn default() -> Self {
        Self::new(Duration::ZERO, 0, Duration::ZERO)
    }
}

impl AttackOptions {
    pub fn new(duration: Duration, rate_per_second: u32, timeout: Duration) -> Self {
        Self {
            duration,
            rate_per_second,
            timeout,
            rate: Rate::per_second(rate_per_second),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn rate_per_second(&self) -> u32 {
        self.rate_per_second
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rate descriptor consumed by the attack engine.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// Set the rate and recompute the engine descriptor.
    pub fn set_rate_per_second(&mut self, rate_per_second: u32) {
        self.rate_per_second = rate_per_second;
        self.rate = Rate::per_second(rate_per_second);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Fill unset values with the defaults and cap the timeout.
    pub fn init(&mut self) {
        if self.timeout.is_zero() || self.timeout > DEFAULT_ATTACK_TIMEOUT {
            self.timeout = DEFAULT_ATTACK_TIMEOUT;
        }
        if self.rate_per_second == 0 {
            self.set_rate_per_second(DEFAULT_ATTACK_RATE_PER_SECOND);
        }
        if self.duration.is_zero() {
            self.duration = DEFAULT_ATTACK_DURATION;
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawAttackOptions {
    #[serde(default, with = "humantime_serde")]
    duration: Duration,
    #[serde(default)]
    rate_per_second: u32,
    #[serde(default, with = "humantime_serde")]
    timeout: Duration,
}

impl From<RawAttackOptions> for AttackOptions {
    fn from(raw: RawAttackOptions) -> Self {
        Self::new(raw.duration, raw.rate_per_second, raw.timeout)
    }
}

impl From<AttackOptions> for RawAttackOptions {
    fn from(opts: AttackOptions) -> Self {
        Self {
            duration: opts.duration,
            rate_per_second: opts.rate_per_second,
            timeout: opts.timeout,
        }
    }
}

/// Serde helpers for durations written as humantime strings ("30s", "1m").
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
