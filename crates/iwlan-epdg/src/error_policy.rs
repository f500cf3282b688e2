// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use crate::error::IwlanError;

/// Fail cause reported to the modem alongside a failed data call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataFailCause(pub i32);

impl DataFailCause {
    pub const NONE: Self = Self(0);
    pub const USER_AUTHENTICATION: Self = Self(29);
    pub const ERROR_UNSPECIFIED: Self = Self(0xffff);
}

impl fmt::Display for DataFailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("NONE"),
            Self::USER_AUTHENTICATION => f.write_str("USER_AUTHENTICATION"),
            Self::ERROR_UNSPECIFIED => f.write_str("ERROR_UNSPECIFIED"),
            Self(other) => write!(f, "UNKNOWN({other})"),
        }
    }
}

/// Retry time that tells the modem not to retry at all.
pub const NO_RETRY: i64 = -1;

/// Maps per-APN tunnel errors onto modem fail causes and retry backoff.
pub trait ErrorPolicyManager: Send + Sync {
    fn get_data_fail_cause(&self, apn: &str) -> DataFailCause;

    /// Retry duration in milliseconds, [`NO_RETRY`] to stop retrying.
    fn get_current_retry_time(&self, apn: &str) -> i64;

    /// Records the outcome of a bringup or teardown. The returned value is the
    /// retry time derived from it.
    fn report_iwlan_error(&self, _apn: &str, _error: &IwlanError) -> i64 {
        NO_RETRY
    }

    fn can_bring_up_tunnel(&self, _apn: &str) -> bool {
        true
    }

    fn get_last_error(&self, _apn: &str) -> IwlanError {
        IwlanError::NoError
    }
}
