// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

pub mod config;
pub mod epdg_selector;
pub mod error_policy;
pub mod ike;
pub mod tunnel_manager;

mod error;
mod link_properties;
mod network;
mod request;

pub use crate::{
    config::{CarrierConfig, CarrierConfigProvider},
    epdg_selector::{EpdgSelector, ProtoFilter},
    error::{ConfigError, IkeException, IwlanError},
    error_policy::{DataFailCause, ErrorPolicyManager, NO_RETRY},
    link_properties::TunnelLinkProperties,
    network::Network,
    request::{ApnProtocol, TunnelSetupRequest, TunnelSetupRequestBuilder, MAX_PDU_SESSION_ID},
    tunnel_manager::{TunnelCallback, TunnelManager, TunnelManagerDeps},
};
