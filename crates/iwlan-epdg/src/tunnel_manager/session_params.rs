// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::net::IpAddr;

use crate::{
    config::SessionTimers,
    epdg_selector::ProtoFilter,
    ike::{
        ChildConfigRequest, ChildSessionParams, Ike3gppExtension, IkeConfigRequest,
        IkeSessionParams, TrafficSelector,
    },
    network::Network,
    request::{ApnProtocol, TunnelSetupRequest},
};

pub(super) fn proto_filter(protocol: ApnProtocol) -> ProtoFilter {
    match protocol {
        ApnProtocol::Ipv4 => ProtoFilter::Ipv4,
        ApnProtocol::Ipv6 => ProtoFilter::Ipv6,
        _ => ProtoFilter::Ipv4v6,
    }
}

pub(super) fn ike_session_params(
    request: &TunnelSetupRequest,
    server: IpAddr,
    network: Option<Network>,
    timers: &SessionTimers,
) -> IkeSessionParams {
    let ike_3gpp_extension = u8::try_from(request.pdu_session_id())
        .ok()
        .filter(|pdu_session_id| *pdu_session_id > 0)
        .map(|pdu_session_id| Ike3gppExtension { pdu_session_id });

    let mut config_requests = Vec::new();
    if request.request_pcscf() {
        let protocol = request.apn_ip_protocol();
        if protocol.includes_ipv4() {
            config_requests.push(IkeConfigRequest::Ipv4Pcscf);
        }
        if protocol.includes_ipv6() {
            config_requests.push(IkeConfigRequest::Ipv6Pcscf);
        }
    }

    IkeSessionParams {
        server_hostname: server,
        network,
        hard_lifetime: timers.ike.hard,
        soft_lifetime: timers.ike.soft,
        retransmission_timeouts_millis: timers.retransmission_timeouts_millis.clone(),
        dpd_delay: timers.dpd_delay,
        ike_3gpp_extension,
        config_requests,
    }
}

pub(super) fn traffic_selectors(protocol: ApnProtocol) -> Vec<TrafficSelector> {
    let mut selectors = Vec::with_capacity(2);
    if protocol.includes_ipv4() {
        selectors.push(TrafficSelector::ipv4_any());
    }
    if protocol.includes_ipv6() {
        selectors.push(TrafficSelector::ipv6_any());
    }
    selectors
}

pub(super) fn child_session_params(
    request: &TunnelSetupRequest,
    timers: &SessionTimers,
) -> ChildSessionParams {
    let protocol = request.apn_ip_protocol();
    let selectors = traffic_selectors(protocol);

    let mut config_requests = Vec::new();
    if request.is_handover() {
        if let Some(address) = request.src_ipv4_address() {
            config_requests.push(ChildConfigRequest::SpecificIpv4Address(address));
        }
        if let Some(address) = request.src_ipv6_address() {
            config_requests.push(ChildConfigRequest::SpecificIpv6Address(
                address,
                request.src_ipv6_prefix_length(),
            ));
        }
    } else {
        if protocol.includes_ipv4() {
            config_requests.push(ChildConfigRequest::Ipv4Address);
        }
        if protocol.includes_ipv6() {
            config_requests.push(ChildConfigRequest::Ipv6Address);
        }
    }
    if protocol.includes_ipv4() {
        config_requests.push(ChildConfigRequest::Ipv4Dns);
    }
    if protocol.includes_ipv6() {
        config_requests.push(ChildConfigRequest::Ipv6Dns);
    }

    ChildSessionParams {
        hard_lifetime: timers.child_sa.hard,
        soft_lifetime: timers.child_sa.soft,
        inbound_traffic_selectors: selectors.clone(),
        outbound_traffic_selectors: selectors,
        config_requests,
    }
}
