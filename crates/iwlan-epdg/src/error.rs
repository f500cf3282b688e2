// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

/// Closed taxonomy of tunnel errors reported through `TunnelCallback::on_closed`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Default)]
pub enum IwlanError {
    #[default]
    #[error("no error")]
    NoError,

    #[error("ike protocol exception, error type: {0}")]
    IkeProtocolException(u32),

    #[error("ike internal io exception")]
    IkeInternalIoException,

    #[error("ike generic exception")]
    IkeGenericException,

    #[error("epdg selector failed to select a server")]
    EpdgSelectorServerSelectionFailed,

    #[error("failed to apply ipsec tunnel transforms")]
    TunnelTransformFailed,

    #[error("sim not ready")]
    SimNotReady,
}

impl IwlanError {
    pub fn is_error(&self) -> bool {
        !matches!(self, IwlanError::NoError)
    }
}

/// Failure reported by the IKE library when a session closes exceptionally.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IkeException {
    /// Error notification exchanged with the peer.
    #[error("ike protocol error, type {error_type}")]
    Protocol { error_type: u32 },

    /// Retransmissions exhausted or socket failure.
    #[error("ike internal io error: {0}")]
    InternalIo(String),

    #[error("ike error: {0}")]
    Generic(String),
}

impl From<&IkeException> for IwlanError {
    fn from(value: &IkeException) -> Self {
        match value {
            IkeException::Protocol { error_type } => IwlanError::IkeProtocolException(*error_type),
            IkeException::InternalIo(_) => IwlanError::IkeInternalIoException,
            IkeException::Generic(_) => IwlanError::IkeGenericException,
        }
    }
}

impl From<IkeException> for IwlanError {
    fn from(value: IkeException) -> Self {
        IwlanError::from(&value)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read carrier config file {file}: {error}")]
    ReadConfig {
        file: PathBuf,
        error: std::io::Error,
    },

    #[error("failed to parse carrier config: {0}")]
    Parse(#[from] Box<toml::de::Error>),

    #[error("failed to parse carrier config file {file}: {error}")]
    ParseFile {
        file: PathBuf,
        error: Box<toml::de::Error>,
    },
}
