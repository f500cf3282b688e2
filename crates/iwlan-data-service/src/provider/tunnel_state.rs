// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use iwlan_epdg::{ApnProtocol, DataFailCause, TunnelLinkProperties};

use crate::{
    callback::DataServiceCallback,
    cid::apn_to_cid,
    types::{DataCallResponse, HandoverFailureMode, LinkStatus, DEFAULT_MTU},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelStatus {
    Down,
    BringUp,
    Up,
    BringDown,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelStatus::Down => write!(f, "down"),
            TunnelStatus::BringUp => write!(f, "bringup"),
            TunnelStatus::Up => write!(f, "up"),
            TunnelStatus::BringDown => write!(f, "bringdown"),
        }
    }
}

/// Provider side view of an apn's tunnel.
pub(super) struct TunnelState {
    pub status: TunnelStatus,
    pub protocol_type: ApnProtocol,
    pub is_handover: bool,
    pub link_properties: Option<TunnelLinkProperties>,
    pub data_callback: Option<Arc<dyn DataServiceCallback>>,
}

impl TunnelState {
    pub fn new(
        protocol_type: ApnProtocol,
        is_handover: bool,
        data_callback: Arc<dyn DataServiceCallback>,
    ) -> Self {
        Self {
            status: TunnelStatus::BringUp,
            protocol_type,
            is_handover,
            link_properties: None,
            data_callback: Some(data_callback),
        }
    }

    /// Snapshot of the call as reported in the data call list.
    pub fn to_data_call_response(&self, apn: &str) -> DataCallResponse {
        let mut response = DataCallResponse::new(apn_to_cid(apn), self.protocol_type);

        let (TunnelStatus::Up, Some(link_properties)) = (self.status, &self.link_properties)
        else {
            return response;
        };

        // Wildcard gateways only tell the platform which families to route.
        let mut gateway_addresses = Vec::with_capacity(2);
        if link_properties.has_ipv4_address() {
            gateway_addresses.push(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        }
        if link_properties.has_ipv6_address() {
            gateway_addresses.push(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        }

        response.link_status = LinkStatus::Active;
        response.interface_name = Some(link_properties.iface_name.clone());
        response.addresses = link_properties.internal_addresses.clone();
        response.dns_addresses = link_properties.dns_addresses.clone();
        response.pcscf_addresses = link_properties.pcscf_addresses.clone();
        response.gateway_addresses = gateway_addresses;
        response.mtu_v4 = Some(DEFAULT_MTU);
        response.mtu_v6 = Some(DEFAULT_MTU);
        response
    }

    /// Response for a setup that never reached [`TunnelStatus::Up`].
    pub fn to_failed_setup_response(
        &self,
        apn: &str,
        cause: DataFailCause,
        retry_duration_millis: i64,
    ) -> DataCallResponse {
        let mut response = DataCallResponse::new(apn_to_cid(apn), self.protocol_type);
        response.cause = cause;
        response.retry_duration_millis = retry_duration_millis;
        response.handover_failure_mode = if self.is_handover {
            HandoverFailureMode::NoFallbackRetryHandover
        } else {
            HandoverFailureMode::NoFallbackRetrySetupNormal
        };
        response
    }
}
