// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Duration,
};

use crate::network::Network;

/// 3GPP specific IKE extensions attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ike3gppExtension {
    /// N1 mode capability, carrying the PDU session id as a single byte.
    pub pdu_session_id: u8,
}

/// Configuration requests sent in the IKE_AUTH exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IkeConfigRequest {
    Ipv4Pcscf,
    Ipv6Pcscf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeSessionParams {
    pub server_hostname: IpAddr,
    pub network: Option<Network>,
    pub hard_lifetime: Duration,
    pub soft_lifetime: Duration,
    pub retransmission_timeouts_millis: Vec<u32>,
    pub dpd_delay: Duration,
    pub ike_3gpp_extension: Option<Ike3gppExtension>,
    pub config_requests: Vec<IkeConfigRequest>,
}

/// Inclusive address and port range negotiated for a child SA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSelector {
    pub start_port: u16,
    pub end_port: u16,
    pub start_address: IpAddr,
    pub end_address: IpAddr,
}

impl TrafficSelector {
    pub fn ipv4_any() -> Self {
        Self {
            start_port: 0,
            end_port: u16::MAX,
            start_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            end_address: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }

    pub fn ipv6_any() -> Self {
        Self {
            start_port: 0,
            end_port: u16::MAX,
            start_address: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            end_address: IpAddr::V6(Ipv6Addr::from(u128::MAX)),
        }
    }
}

/// Tunnel mode configuration requests sent when creating the child SA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildConfigRequest {
    /// Any IPv4 internal address.
    Ipv4Address,
    /// Any IPv6 internal address.
    Ipv6Address,
    /// A specific IPv4 address, used to keep the address across a handover.
    SpecificIpv4Address(Ipv4Addr),
    /// A specific IPv6 address with its prefix length.
    SpecificIpv6Address(Ipv6Addr, u8),
    Ipv4Dns,
    Ipv6Dns,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSessionParams {
    pub hard_lifetime: Duration,
    pub soft_lifetime: Duration,
    pub inbound_traffic_selectors: Vec<TrafficSelector>,
    pub outbound_traffic_selectors: Vec<TrafficSelector>,
    pub config_requests: Vec<ChildConfigRequest>,
}
