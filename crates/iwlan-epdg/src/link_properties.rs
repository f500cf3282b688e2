// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, net::IpAddr};

use ipnetwork::IpNetwork;

/// Link properties of an established tunnel, as negotiated with the ePDG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelLinkProperties {
    pub internal_addresses: Vec<IpNetwork>,
    pub dns_addresses: Vec<IpAddr>,
    pub pcscf_addresses: Vec<IpAddr>,
    pub iface_name: String,
}

impl TunnelLinkProperties {
    pub fn has_ipv4_address(&self) -> bool {
        self.internal_addresses.iter().any(|addr| addr.is_ipv4())
    }

    pub fn has_ipv6_address(&self) -> bool {
        self.internal_addresses.iter().any(|addr| addr.is_ipv6())
    }
}

impl fmt::Display for TunnelLinkProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iface: {}, internal addresses: {:?}, dns: {:?}, pcscf: {:?}",
            self.iface_name, self.internal_addresses, self.dns_addresses, self.pcscf_addresses
        )
    }
}
