// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::net::IpAddr;

use crate::{error::IwlanError, network::Network};

/// Address families to keep in the resolved server list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoFilter {
    Ipv4,
    Ipv6,
    Ipv4v6,
}

/// Resolves the carrier's ePDG candidates into an ordered list of validated addresses.
#[async_trait::async_trait]
pub trait EpdgSelector: Send + Sync {
    async fn get_validated_server_list(
        &self,
        filter: ProtoFilter,
        is_emergency: bool,
        is_roaming: bool,
        network: Option<Network>,
    ) -> Result<Vec<IpAddr>, IwlanError>;
}
