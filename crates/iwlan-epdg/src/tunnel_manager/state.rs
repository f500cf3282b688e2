// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{net::IpAddr, sync::Arc};

use super::TunnelCallback;
use crate::{
    error::IwlanError, ike::IkeSession, link_properties::TunnelLinkProperties,
    request::TunnelSetupRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TunnelPhase {
    Connecting,
    Open,
    Closing,
}

/// Bringup waiting for an ePDG address.
pub(super) struct PendingRequest {
    pub request: TunnelSetupRequest,
    pub callback: Arc<dyn TunnelCallback>,
}

pub(super) struct TunnelConfig {
    pub session: Box<dyn IkeSession>,
    pub session_id: u64,
    pub request: TunnelSetupRequest,
    pub callback: Arc<dyn TunnelCallback>,
    pub phase: TunnelPhase,
    /// Error recorded by the manager itself, reported instead of the session's own.
    pub last_error: IwlanError,
    pub link_properties: Option<TunnelLinkProperties>,
    /// Set while this tunnel is probing the validated server list.
    pub is_selection_attempt: bool,
}

#[derive(Default)]
pub(super) struct EpdgSelectionState {
    /// A tunnel reached the ePDG at `validated_addresses[index]`.
    pub is_selected: bool,
    pub validated_addresses: Vec<IpAddr>,
    pub index: usize,
    /// Id of the selector query in flight, if any.
    pub in_flight: Option<u64>,
    /// Request that triggered the query in flight.
    pub request: Option<PendingRequest>,
}

impl EpdgSelectionState {
    pub fn selected_address(&self) -> Option<IpAddr> {
        if self.is_selected {
            self.validated_addresses.get(self.index).copied()
        } else {
            None
        }
    }

    pub fn current_candidate(&self) -> Option<IpAddr> {
        self.validated_addresses.get(self.index).copied()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || (!self.is_selected && !self.validated_addresses.is_empty())
    }
}
