// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

mod tunnel_state;

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use ipnetwork::IpNetwork;
use iwlan_epdg::{
    ErrorPolicyManager, IwlanError, Network, TunnelCallback, TunnelLinkProperties,
    TunnelSetupRequest,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

pub use tunnel_state::TunnelStatus;

use crate::{
    callback::DataServiceCallback,
    cid::apn_to_cid,
    service::DataServiceInner,
    tunnel_controller::{SlotContext, TunnelController},
    types::{
        AccessNetworkType, ApnTypes, DataCallResponse, DataProfile, DataServiceResult,
        LinkProperties, RequestReason,
    },
    wifi_monitor::WifiState,
};
use tunnel_state::TunnelState;

const DATA_CALL_LIST_CHANNEL_CAPACITY: usize = 16;

type TunnelStates = HashMap<String, TunnelState>;

/// State shared between the provider and the tunnel manager callbacks.
struct ProviderShared {
    slot_index: u32,
    tunnels: Mutex<TunnelStates>,
    error_policy: Arc<dyn ErrorPolicyManager>,
    data_call_list_tx: broadcast::Sender<Vec<DataCallResponse>>,
}

impl ProviderShared {
    fn data_call_list(tunnels: &TunnelStates) -> Vec<DataCallResponse> {
        tunnels
            .iter()
            .map(|(apn, state)| state.to_data_call_response(apn))
            .collect()
    }

    fn notify_data_call_list_changed(&self, tunnels: &TunnelStates) {
        // No subscribers is fine.
        let _ = self
            .data_call_list_tx
            .send(Self::data_call_list(tunnels));
    }

    fn deliver_setup_complete(
        &self,
        tunnels: &TunnelStates,
        callback: Option<&Arc<dyn DataServiceCallback>>,
        result: DataServiceResult,
        response: Option<DataCallResponse>,
    ) {
        let Some(callback) = callback else {
            tracing::debug!("No callback for setup data call result: {result}");
            return;
        };
        tracing::debug!(
            "Slot {}: delivering setup data call result: {result}, response: {:?}",
            self.slot_index,
            response
        );
        callback.on_setup_data_call_complete(result, response);
        self.notify_data_call_list_changed(tunnels);
    }

    fn deliver_deactivate_complete(
        &self,
        tunnels: &TunnelStates,
        callback: Option<&Arc<dyn DataServiceCallback>>,
        result: DataServiceResult,
    ) {
        let Some(callback) = callback else {
            tracing::debug!("No callback for deactivate data call result: {result}");
            return;
        };
        tracing::debug!(
            "Slot {}: delivering deactivate data call result: {result}",
            self.slot_index
        );
        callback.on_deactivate_data_call_complete(result);
        self.notify_data_call_list_changed(tunnels);
    }
}

impl TunnelCallback for ProviderShared {
    fn on_opened(&self, apn: &str, link_properties: TunnelLinkProperties) {
        tracing::info!("Slot {}: tunnel opened for {apn}: {link_properties}", self.slot_index);

        let mut tunnels = self.tunnels.lock();
        let Some(state) = tunnels.get_mut(apn) else {
            tracing::error!("Tunnel opened for unknown apn {apn}");
            return;
        };
        if state.status != TunnelStatus::BringUp {
            tracing::warn!("Tunnel for {apn} opened while {}", state.status);
            return;
        }

        state.status = TunnelStatus::Up;
        state.link_properties = Some(link_properties);
        let response = state.to_data_call_response(apn);
        let callback = state.data_callback.clone();

        self.deliver_setup_complete(
            &tunnels,
            callback.as_ref(),
            DataServiceResult::Success,
            Some(response),
        );
    }

    fn on_closed(&self, apn: &str, error: IwlanError) {
        tracing::info!("Slot {}: tunnel closed for {apn}: {error}", self.slot_index);

        let mut tunnels = self.tunnels.lock();
        let Some(state) = tunnels.remove(apn) else {
            tracing::warn!("Tunnel closed for unknown apn {apn}");
            return;
        };

        match state.status {
            TunnelStatus::BringUp => {
                let response = state.to_failed_setup_response(
                    apn,
                    self.error_policy.get_data_fail_cause(apn),
                    self.error_policy.get_current_retry_time(apn),
                );
                self.deliver_setup_complete(
                    &tunnels,
                    state.data_callback.as_ref(),
                    DataServiceResult::Success,
                    Some(response),
                );
            }
            TunnelStatus::BringDown => {
                // Retransmission failures are expected when wifi goes away mid teardown.
                if !matches!(
                    error,
                    IwlanError::NoError | IwlanError::IkeInternalIoException
                ) {
                    drop(tunnels);
                    panic!("Unexpected error during tunnel bring down for {apn}: {error}");
                }
                self.deliver_deactivate_complete(
                    &tunnels,
                    state.data_callback.as_ref(),
                    DataServiceResult::Success,
                );
            }
            TunnelStatus::Up | TunnelStatus::Down => self.notify_data_call_list_changed(&tunnels),
        }
    }
}

/// Per slot data service: translates modem data calls into tunnels.
pub struct DataServiceProvider {
    slot_index: u32,
    shared: Arc<ProviderShared>,
    tunnel_controller: Arc<dyn TunnelController>,
    wifi_state: watch::Receiver<WifiState>,
    service: Weak<DataServiceInner>,
    shutdown_token: CancellationToken,
}

impl DataServiceProvider {
    pub(crate) fn new(
        slot_index: u32,
        slot_context: SlotContext,
        wifi_state: watch::Receiver<WifiState>,
        service: Weak<DataServiceInner>,
    ) -> Self {
        let (data_call_list_tx, _) = broadcast::channel(DATA_CALL_LIST_CHANNEL_CAPACITY);
        Self {
            slot_index,
            shared: Arc::new(ProviderShared {
                slot_index,
                tunnels: Mutex::new(HashMap::new()),
                error_policy: slot_context.error_policy,
                data_call_list_tx,
            }),
            tunnel_controller: slot_context.tunnel_controller,
            wifi_state,
            service,
            shutdown_token: slot_context.shutdown_token,
        }
    }

    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }

    pub fn is_wifi_connected(&self) -> bool {
        self.wifi_state.borrow().connected
    }

    pub fn tunnel_status(&self, apn: &str) -> TunnelStatus {
        self.shared
            .tunnels
            .lock()
            .get(apn)
            .map_or(TunnelStatus::Down, |state| state.status)
    }

    /// Stream of the data call list, published after every completed setup or deactivate.
    pub fn subscribe_data_call_list_changed(&self) -> broadcast::Receiver<Vec<DataCallResponse>> {
        self.shared.data_call_list_tx.subscribe()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn setup_data_call(
        &self,
        access_network_type: AccessNetworkType,
        data_profile: Option<DataProfile>,
        is_roaming: bool,
        allow_roaming: bool,
        reason: RequestReason,
        link_properties: Option<LinkProperties>,
        pdu_session_id: i32,
        callback: Arc<dyn DataServiceCallback>,
    ) {
        tracing::debug!(
            "Slot {}: setup data call on {:?}, reason: {:?}, pdu session id: {pdu_session_id}, \
             roaming: {is_roaming} (allowed: {allow_roaming}), link properties: {:?}, profile: {:?}",
            self.slot_index,
            access_network_type,
            reason,
            link_properties,
            data_profile
        );

        let is_handover = reason == RequestReason::Handover;
        let profile = match data_profile {
            Some(profile)
                if access_network_type == AccessNetworkType::Iwlan
                    && (!is_handover || link_properties.is_some()) =>
            {
                profile
            }
            _ => {
                let tunnels = self.shared.tunnels.lock();
                self.shared.deliver_setup_complete(
                    &tunnels,
                    Some(&callback),
                    DataServiceResult::ErrorInvalidArg,
                    None,
                );
                return;
            }
        };

        let mut tunnels = self.shared.tunnels.lock();
        let wifi_state = *self.wifi_state.borrow();
        if !wifi_state.connected || tunnels.contains_key(&profile.apn) {
            tracing::warn!(
                "Rejecting setup for {}, wifi connected: {}",
                profile.apn,
                wifi_state.connected
            );
            self.shared.deliver_setup_complete(
                &tunnels,
                Some(&callback),
                DataServiceResult::ErrorIllegalState,
                None,
            );
            return;
        }

        let request = tunnel_setup_request(
            &profile,
            wifi_state.network,
            is_roaming,
            link_properties.as_ref().filter(|_| is_handover),
            pdu_session_id,
        );
        tunnels.insert(
            profile.apn.clone(),
            TunnelState::new(profile.protocol_type, is_handover, callback.clone()),
        );

        let tunnel_callback: Arc<dyn TunnelCallback> = self.shared.clone();
        if !self.tunnel_controller.bring_up_tunnel(request, tunnel_callback) {
            tracing::error!("Tunnel bringup for {} was refused", profile.apn);
            tunnels.remove(&profile.apn);
            self.shared.deliver_setup_complete(
                &tunnels,
                Some(&callback),
                DataServiceResult::ErrorInvalidArg,
                None,
            );
        }
    }

    pub fn deactivate_data_call(
        &self,
        cid: i32,
        reason: RequestReason,
        callback: Option<Arc<dyn DataServiceCallback>>,
    ) {
        tracing::debug!(
            "Slot {}: deactivate data call {cid}, reason: {:?}",
            self.slot_index,
            reason
        );

        let mut tunnels = self.shared.tunnels.lock();
        let apn = tunnels.keys().find(|apn| apn_to_cid(apn) == cid).cloned();
        let Some(apn) = apn else {
            self.shared.deliver_deactivate_complete(
                &tunnels,
                callback.as_ref(),
                DataServiceResult::ErrorInvalidArg,
            );
            return;
        };

        // Setup and deactivate for one cid are serialized by the modem, so any state goes.
        if let Some(state) = tunnels.get_mut(&apn) {
            state.status = TunnelStatus::BringDown;
            state.data_callback = callback;
        }
        self.tunnel_controller
            .close_tunnel(&apn, !self.is_wifi_connected());
    }

    pub fn request_data_call_list(&self, callback: Arc<dyn DataServiceCallback>) {
        let tunnels = self.shared.tunnels.lock();
        let data_call_list = ProviderShared::data_call_list(&tunnels);
        callback.on_request_data_call_list_complete(DataServiceResult::Success, data_call_list);
    }

    pub fn force_close_tunnels_in_deactivating_state(&self) {
        let tunnels = self.shared.tunnels.lock();
        for (apn, state) in tunnels.iter() {
            if state.status == TunnelStatus::BringDown {
                tracing::info!("Slot {}: force closing tunnel for {apn}", self.slot_index);
                self.tunnel_controller.close_tunnel(apn, true);
            }
        }
    }

    pub(crate) fn update_network(&self, network: Option<Network>) {
        self.tunnel_controller.update_network(network);
    }

    /// Stops the slot's tunnel manager, tearing down its tunnels.
    pub(crate) fn shutdown(&self) {
        tracing::debug!("Slot {}: stopping tunnels", self.slot_index);
        self.shutdown_token.cancel();
    }

    /// Removes this provider from its data service.
    pub fn close(&self) {
        match self.service.upgrade() {
            Some(service) => service.remove_provider(self.slot_index),
            None => tracing::debug!("Data service already gone for slot {}", self.slot_index),
        }
    }
}

fn tunnel_setup_request(
    profile: &DataProfile,
    network: Option<Network>,
    is_roaming: bool,
    handover_link_properties: Option<&LinkProperties>,
    pdu_session_id: i32,
) -> TunnelSetupRequest {
    let protocol = if is_roaming {
        profile.roaming_protocol_type
    } else {
        profile.protocol_type
    };
    let apn_types = profile.supported_apn_types;
    let is_emergency = apn_types.contains(ApnTypes::EMERGENCY);

    let mut builder = TunnelSetupRequest::builder(&profile.apn)
        .network(network)
        .is_roaming(is_roaming)
        .pdu_session_id(pdu_session_id)
        .apn_ip_protocol(protocol)
        .request_pcscf(apn_types.contains(ApnTypes::IMS) || is_emergency)
        .is_emergency(is_emergency);

    // At most one source address per family is carried over.
    if let Some(link_properties) = handover_link_properties {
        let addresses = &link_properties.link_addresses;
        if let Some(address) = addresses.iter().find_map(|address| match address {
            IpNetwork::V4(network) => Some(network.ip()),
            IpNetwork::V6(_) => None,
        }) {
            builder = builder.src_ipv4_address(address);
        }
        if let Some(network) = addresses.iter().find_map(|address| match address {
            IpNetwork::V6(network) => Some(network),
            IpNetwork::V4(_) => None,
        }) {
            builder = builder.src_ipv6_address(network.ip(), network.prefix());
        }
    }

    builder.build()
}
