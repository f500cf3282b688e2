// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, net::IpAddr};

use ipnetwork::IpNetwork;
use iwlan_epdg::{ApnProtocol, DataFailCause};

/// MTU reported for both address families, the IPv6 minimum.
pub const DEFAULT_MTU: u16 = 1280;

bitflags::bitflags! {
    /// Apn types served by a data profile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ApnTypes: u32 {
        const DEFAULT = 17;
        const MMS = 2;
        const SUPL = 4;
        const DUN = 8;
        const HIPRI = 16;
        const FOTA = 32;
        const IMS = 64;
        const CBS = 128;
        const IA = 256;
        const EMERGENCY = 512;
        const MCX = 1024;
        const XCAP = 2048;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessNetworkType {
    Unknown,
    Geran,
    Utran,
    Eutran,
    Cdma2000,
    Iwlan,
    Ngran,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestReason {
    Normal,
    Handover,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataProfile {
    pub apn: String,
    pub protocol_type: ApnProtocol,
    pub roaming_protocol_type: ApnProtocol,
    pub supported_apn_types: ApnTypes,
}

/// Link properties of the source network when handing a call over to Wi-Fi.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkProperties {
    pub link_addresses: Vec<IpNetwork>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataServiceResult {
    Success,
    ErrorUnsupported,
    ErrorInvalidArg,
    ErrorBusy,
    ErrorIllegalState,
}

impl fmt::Display for DataServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::ErrorUnsupported => write!(f, "error: unsupported"),
            Self::ErrorInvalidArg => write!(f, "error: invalid argument"),
            Self::ErrorBusy => write!(f, "error: busy"),
            Self::ErrorIllegalState => write!(f, "error: illegal state"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Unknown,
    Inactive,
    Dormant,
    Active,
}

/// Tells the modem how to react to a failed setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoverFailureMode {
    #[default]
    Unknown,
    Legacy,
    DoFallback,
    NoFallbackRetryHandover,
    NoFallbackRetrySetupNormal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCallResponse {
    pub id: i32,
    pub cause: DataFailCause,
    pub retry_duration_millis: i64,
    pub link_status: LinkStatus,
    pub protocol_type: ApnProtocol,
    pub interface_name: Option<String>,
    pub addresses: Vec<IpNetwork>,
    pub dns_addresses: Vec<IpAddr>,
    pub gateway_addresses: Vec<IpAddr>,
    pub pcscf_addresses: Vec<IpAddr>,
    pub mtu_v4: Option<u16>,
    pub mtu_v6: Option<u16>,
    pub handover_failure_mode: HandoverFailureMode,
}

impl DataCallResponse {
    pub fn new(id: i32, protocol_type: ApnProtocol) -> Self {
        Self {
            id,
            cause: DataFailCause::NONE,
            retry_duration_millis: iwlan_epdg::NO_RETRY,
            link_status: LinkStatus::Unknown,
            protocol_type,
            interface_name: None,
            addresses: Vec::new(),
            dns_addresses: Vec::new(),
            gateway_addresses: Vec::new(),
            pcscf_addresses: Vec::new(),
            mtu_v4: None,
            mtu_v6: None,
            handover_failure_mode: HandoverFailureMode::default(),
        }
    }
}
