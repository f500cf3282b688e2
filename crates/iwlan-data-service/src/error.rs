// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to register wifi network callback: {reason}")]
    RegisterNetworkCallback { reason: String },

    #[error("data service has been shut down")]
    ServiceShutDown,

    #[error("invalid log filter in environment: {0}")]
    LogFilterFromEnv(#[from] tracing_subscriber::filter::FromEnvError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
