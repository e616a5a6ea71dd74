//! How long to wait before retrying after failed flushes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Doubling delay with a ceiling and symmetric random spread.
///
/// After `n` consecutive failures the nominal delay is
/// `min(max_delay_ms, base_delay_ms * 2^(n-1))`, then scaled by a factor
/// drawn uniformly from `[1 - jitter_factor, 1 + jitter_factor]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffPolicy {
    /// Delay after the first failure, in ms.
    pub base_delay_ms: u64,
    /// Ceiling on the nominal delay, in ms.
    pub max_delay_ms: u64,
    /// Relative spread; `0.2` means up to 20% either way.
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 30_000,
            max_delay_ms: 30 * 60 * 1000,
            jitter_factor: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Delay before jitter after `failures` consecutive failures. Zero
    /// failures is treated as one.
    #[must_use]
    pub fn nominal_ms(&self, failures: u32) -> u64 {
        let doublings = failures.saturating_sub(1).min(63);
        self.base_delay_ms
            .checked_mul(1 << doublings)
            .unwrap_or(u64::MAX)
            .min(self.max_delay_ms)
    }

    /// Delay after `failures` consecutive failures, with `unit` in `[0, 1)`
    /// picking the point inside the jitter band (`0.5` is the nominal delay).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for(&self, failures: u32, unit: f64) -> Duration {
        let spread = self.jitter_factor * (2.0 * unit - 1.0);
        let ms = (self.nominal_ms(failures) as f64 * (1.0 + spread)).round();
        Duration::from_millis(ms.max(0.0) as u64)
    }

    /// [`Self::delay_for`] with a random point in the band.
    #[must_use]
    pub fn sample(&self, failures: u32) -> Duration {
        self.delay_for(failures, rand::random::<f64>())
    }
}
