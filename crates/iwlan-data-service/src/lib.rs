// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

pub mod logging;
pub mod tunnel_controller;
pub mod wifi_monitor;

mod callback;
mod cid;
mod error;
mod provider;
mod service;
#[cfg(test)]
mod test_support;
mod types;

// Re-export the tunnel layer
pub use iwlan_epdg;

pub use crate::{
    callback::DataServiceCallback,
    cid::apn_to_cid,
    error::{Error, Result},
    provider::{DataServiceProvider, TunnelStatus},
    service::DataService,
    tunnel_controller::{SlotContext, SlotContextFactory, TunnelController, TunnelManagerFactory},
    types::{
        AccessNetworkType, ApnTypes, DataCallResponse, DataProfile, DataServiceResult,
        HandoverFailureMode, LinkProperties, LinkStatus, RequestReason, DEFAULT_MTU,
    },
    wifi_monitor::{NetworkMonitor, NetworkRequest, WifiMonitorEvent, WifiState},
};
