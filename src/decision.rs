//! Stand-in agent decision policy
//!
//! A uniform draw in `[0, 1)` below the threshold means "do nothing",
//! anything else means "pay for the API". The random source is injected so
//! tests can pin either branch.

use alloy_primitives::U256;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Source of uniform draws in `[0, 1)`
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

/// `StdRng`-backed source, seedable for reproducible runs
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Scripted draws; repeats the last value once the script runs out
#[derive(Debug, Clone)]
pub struct FixedRandom {
    script: VecDeque<f64>,
    last: f64,
}

impl FixedRandom {
    pub fn always(value: f64) -> Self {
        Self {
            script: VecDeque::new(),
            last: value,
        }
    }

    pub fn sequence(values: impl IntoIterator<Item = f64>) -> Self {
        let script: VecDeque<f64> = values.into_iter().collect();
        let last = script.back().copied().unwrap_or(0.0);
        Self { script, last }
    }
}

impl RandomSource for FixedRandom {
    fn next_unit(&mut self) -> f64 {
        self.script.pop_front().unwrap_or(self.last)
    }
}

/// Outcome of one decision round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Noop {
        reason: String,
    },
    PayApi {
        #[serde(rename = "amountWei", with = "wei_string")]
        amount_wei: U256,
        reason: String,
    },
}

impl Decision {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop { .. })
    }
}

/// Pure policy: `draw < threshold` is a no-op
pub fn decide(draw: f64, threshold: f64, api_amount: U256) -> Decision {
    if draw < threshold {
        Decision::Noop {
            reason: "Idle".to_string(),
        }
    } else {
        Decision::PayApi {
            amount_wei: api_amount,
            reason: "Call API".to_string(),
        }
    }
}

/// Wei amounts travel as decimal strings
mod wei_string {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(&raw, 10).map_err(serde::de::Error::custom)
    }
}
