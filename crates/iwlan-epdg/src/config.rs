// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{collections::HashMap, fmt, fs, path::Path, time::Duration};

use crate::error::ConfigError;

// Carrier keys are the lowercase spelling of the platform names, e.g.
// `IKE_REKEY_HARD_TIMER_SEC_INT` is stored as `ike_rekey_hard_timer_sec_int`.
pub const KEY_IKE_REKEY_HARD_TIMER_SEC_INT: &str = "ike_rekey_hard_timer_sec_int";
pub const KEY_IKE_REKEY_SOFT_TIMER_SEC_INT: &str = "ike_rekey_soft_timer_sec_int";
pub const KEY_CHILD_SA_REKEY_HARD_TIMER_SEC_INT: &str = "child_sa_rekey_hard_timer_sec_int";
pub const KEY_CHILD_SA_REKEY_SOFT_TIMER_SEC_INT: &str = "child_sa_rekey_soft_timer_sec_int";
pub const KEY_RETRANSMIT_TIMER_MSEC_INT_ARRAY: &str = "retransmit_timer_msec_int_array";
pub const KEY_DPD_TIMER_SEC_INT: &str = "dpd_timer_sec_int";

const DEFAULT_IKE_REKEY_HARD_TIMER_SEC: u32 = 14400;
const DEFAULT_IKE_REKEY_SOFT_TIMER_SEC: u32 = 7200;
const DEFAULT_CHILD_SA_REKEY_HARD_TIMER_SEC: u32 = 7200;
const DEFAULT_CHILD_SA_REKEY_SOFT_TIMER_SEC: u32 = 3600;
const DEFAULT_RETRANSMIT_TIMER_MSEC: [u32; 5] = [500, 1000, 2000, 4000, 8000];
const DEFAULT_DPD_TIMER_SEC: u32 = 120;

/// Upper bound on retransmission attempts accepted from carrier config.
const MAX_RETRANSMIT_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum CarrierConfigValue {
    Int(i64),
    IntArray(Vec<i64>),
}

/// Flat bundle of carrier provided settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CarrierConfig {
    values: HashMap<String, CarrierConfigValue>,
}

impl CarrierConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|error| ConfigError::Parse(Box::new(error)))
    }

    pub fn read_from_file<P: AsRef<Path>>(file_path: P) -> Result<Self, ConfigError> {
        let file_path = file_path.as_ref();
        let content = fs::read_to_string(file_path).map_err(|error| ConfigError::ReadConfig {
            file: file_path.to_path_buf(),
            error,
        })?;
        toml::from_str(&content).map_err(|error| ConfigError::ParseFile {
            file: file_path.to_path_buf(),
            error: Box::new(error),
        })
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.values
            .insert(key.to_owned(), CarrierConfigValue::Int(value));
        self
    }

    pub fn with_int_array(mut self, key: &str, value: Vec<i64>) -> Self {
        self.values
            .insert(key.to_owned(), CarrierConfigValue::IntArray(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CarrierConfigValue> {
        self.values.get(key)
    }

    fn timer_secs(&self, key: &str, default: u32) -> u32 {
        match self.get(key) {
            None => default,
            Some(CarrierConfigValue::Int(value)) => match u32::try_from(*value) {
                Ok(value) if value > 0 => value,
                _ => {
                    tracing::warn!("Invalid value {value} for {key}, using {default}");
                    default
                }
            },
            Some(other) => {
                tracing::warn!("Expected an integer for {key}, got {other:?}, using {default}");
                default
            }
        }
    }

    fn lifetimes(&self, hard_key: &str, soft_key: &str, defaults: (u32, u32)) -> Lifetimes {
        let hard = self.timer_secs(hard_key, defaults.0);
        let soft = self.timer_secs(soft_key, defaults.1);
        if soft >= hard {
            tracing::warn!(
                "Soft lifetime {soft}s is not below hard lifetime {hard}s ({soft_key}, {hard_key}), using defaults"
            );
            return Lifetimes::from_secs(defaults.0, defaults.1);
        }
        Lifetimes::from_secs(hard, soft)
    }

    fn retransmit_timers(&self) -> Vec<u32> {
        let default = DEFAULT_RETRANSMIT_TIMER_MSEC.to_vec();
        let values = match self.get(KEY_RETRANSMIT_TIMER_MSEC_INT_ARRAY) {
            None => return default,
            Some(CarrierConfigValue::IntArray(values)) => values,
            Some(other) => {
                tracing::warn!(
                    "Expected an integer array for {KEY_RETRANSMIT_TIMER_MSEC_INT_ARRAY}, got {other:?}"
                );
                return default;
            }
        };

        if values.is_empty() || values.len() > MAX_RETRANSMIT_ATTEMPTS {
            tracing::warn!(
                "Retransmit timer array must hold 1 to {MAX_RETRANSMIT_ATTEMPTS} entries, got {}",
                values.len()
            );
            return default;
        }

        let timers: Option<Vec<u32>> = values
            .iter()
            .map(|value| u32::try_from(*value).ok().filter(|value| *value > 0))
            .collect();
        timers.unwrap_or_else(|| {
            tracing::warn!("Invalid retransmit timers {values:?}, using defaults");
            default
        })
    }

    /// Resolves the session timers, falling back to defaults for absent or invalid keys.
    pub fn session_timers(&self) -> SessionTimers {
        SessionTimers {
            ike: self.lifetimes(
                KEY_IKE_REKEY_HARD_TIMER_SEC_INT,
                KEY_IKE_REKEY_SOFT_TIMER_SEC_INT,
                (
                    DEFAULT_IKE_REKEY_HARD_TIMER_SEC,
                    DEFAULT_IKE_REKEY_SOFT_TIMER_SEC,
                ),
            ),
            child_sa: self.lifetimes(
                KEY_CHILD_SA_REKEY_HARD_TIMER_SEC_INT,
                KEY_CHILD_SA_REKEY_SOFT_TIMER_SEC_INT,
                (
                    DEFAULT_CHILD_SA_REKEY_HARD_TIMER_SEC,
                    DEFAULT_CHILD_SA_REKEY_SOFT_TIMER_SEC,
                ),
            ),
            retransmission_timeouts_millis: self.retransmit_timers(),
            dpd_delay: Duration::from_secs(u64::from(
                self.timer_secs(KEY_DPD_TIMER_SEC_INT, DEFAULT_DPD_TIMER_SEC),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    pub hard: Duration,
    pub soft: Duration,
}

impl Lifetimes {
    fn from_secs(hard: u32, soft: u32) -> Self {
        Self {
            hard: Duration::from_secs(u64::from(hard)),
            soft: Duration::from_secs(u64::from(soft)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimers {
    pub ike: Lifetimes,
    pub child_sa: Lifetimes,
    pub retransmission_timeouts_millis: Vec<u32>,
    pub dpd_delay: Duration,
}

impl Default for SessionTimers {
    fn default() -> Self {
        CarrierConfig::default().session_timers()
    }
}

impl fmt::Display for SessionTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ike: {}s/{}s, child sa: {}s/{}s, retransmit: {:?}ms, dpd: {}s",
            self.ike.hard.as_secs(),
            self.ike.soft.as_secs(),
            self.child_sa.hard.as_secs(),
            self.child_sa.soft.as_secs(),
            self.retransmission_timeouts_millis,
            self.dpd_delay.as_secs()
        )
    }
}

/// Source of the carrier config for a SIM slot, consulted on every bringup.
pub trait CarrierConfigProvider: Send + Sync {
    fn carrier_config(&self, slot_index: u32) -> CarrierConfig;
}

impl CarrierConfigProvider for CarrierConfig {
    fn carrier_config(&self, _slot_index: u32) -> CarrierConfig {
        self.clone()
    }
}
