// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use crate::network::Network;

/// Largest PDU session id that can be carried in the N1 mode extension.
pub const MAX_PDU_SESSION_ID: u8 = 15;

/// IP protocol requested for an APN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApnProtocol {
    Ipv4,
    Ipv6,
    Ipv4v6,
    Ppp,
    NonIp,
    Unstructured,
}

impl ApnProtocol {
    /// Only plain IP families can be carried over an ePDG tunnel.
    pub fn is_tunnelable(&self) -> bool {
        matches!(self, Self::Ipv4 | Self::Ipv6 | Self::Ipv4v6)
    }

    pub fn includes_ipv4(&self) -> bool {
        matches!(self, Self::Ipv4 | Self::Ipv4v6)
    }

    pub fn includes_ipv6(&self) -> bool {
        matches!(self, Self::Ipv6 | Self::Ipv4v6)
    }
}

impl fmt::Display for ApnProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ipv4 => "IP",
            Self::Ipv6 => "IPV6",
            Self::Ipv4v6 => "IPV4V6",
            Self::Ppp => "PPP",
            Self::NonIp => "NON-IP",
            Self::Unstructured => "UNSTRUCTURED",
        };
        f.write_str(name)
    }
}

/// Immutable description of a tunnel to bring up for an APN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSetupRequest {
    apn_name: String,
    network: Option<Network>,
    is_roaming: bool,
    is_emergency: bool,
    request_pcscf: bool,
    apn_ip_protocol: ApnProtocol,
    src_ipv4_address: Option<Ipv4Addr>,
    src_ipv6_address: Option<Ipv6Addr>,
    src_ipv6_prefix_length: u8,
    pdu_session_id: i32,
}

impl TunnelSetupRequest {
    pub fn builder(apn_name: impl Into<String>) -> TunnelSetupRequestBuilder {
        TunnelSetupRequestBuilder::new(apn_name)
    }

    pub fn apn_name(&self) -> &str {
        &self.apn_name
    }

    pub fn network(&self) -> Option<Network> {
        self.network
    }

    pub fn is_roaming(&self) -> bool {
        self.is_roaming
    }

    pub fn is_emergency(&self) -> bool {
        self.is_emergency
    }

    pub fn request_pcscf(&self) -> bool {
        self.request_pcscf
    }

    pub fn apn_ip_protocol(&self) -> ApnProtocol {
        self.apn_ip_protocol
    }

    pub fn src_ipv4_address(&self) -> Option<Ipv4Addr> {
        self.src_ipv4_address
    }

    pub fn src_ipv6_address(&self) -> Option<Ipv6Addr> {
        self.src_ipv6_address
    }

    pub fn src_ipv6_prefix_length(&self) -> u8 {
        self.src_ipv6_prefix_length
    }

    /// Zero means no PDU session id is attached to this request.
    pub fn pdu_session_id(&self) -> i32 {
        self.pdu_session_id
    }

    pub fn is_handover(&self) -> bool {
        self.src_ipv4_address.is_some() || self.src_ipv6_address.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TunnelSetupRequestBuilder {
    request: TunnelSetupRequest,
}

impl TunnelSetupRequestBuilder {
    fn new(apn_name: impl Into<String>) -> Self {
        Self {
            request: TunnelSetupRequest {
                apn_name: apn_name.into(),
                network: None,
                is_roaming: false,
                is_emergency: false,
                request_pcscf: false,
                apn_ip_protocol: ApnProtocol::Ipv4v6,
                src_ipv4_address: None,
                src_ipv6_address: None,
                src_ipv6_prefix_length: 0,
                pdu_session_id: 0,
            },
        }
    }

    pub fn network(mut self, network: Option<Network>) -> Self {
        self.request.network = network;
        self
    }

    pub fn is_roaming(mut self, is_roaming: bool) -> Self {
        self.request.is_roaming = is_roaming;
        self
    }

    pub fn is_emergency(mut self, is_emergency: bool) -> Self {
        self.request.is_emergency = is_emergency;
        self
    }

    pub fn request_pcscf(mut self, request_pcscf: bool) -> Self {
        self.request.request_pcscf = request_pcscf;
        self
    }

    pub fn apn_ip_protocol(mut self, protocol: ApnProtocol) -> Self {
        self.request.apn_ip_protocol = protocol;
        self
    }

    pub fn src_ipv4_address(mut self, address: Ipv4Addr) -> Self {
        self.request.src_ipv4_address = Some(address);
        self
    }

    pub fn src_ipv6_address(mut self, address: Ipv6Addr, prefix_length: u8) -> Self {
        self.request.src_ipv6_address = Some(address);
        self.request.src_ipv6_prefix_length = prefix_length;
        self
    }

    pub fn pdu_session_id(mut self, pdu_session_id: i32) -> Self {
        self.request.pdu_session_id = pdu_session_id;
        self
    }

    pub fn build(self) -> TunnelSetupRequest {
        self.request
    }
}
