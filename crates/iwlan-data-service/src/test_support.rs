// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{net::IpAddr, sync::Arc, time::Duration};

use iwlan_epdg::{
    ike::{ChildSessionParams, IkeSession, IkeSessionCallback, IkeSessionFactory, IkeSessionParams},
    ApnProtocol, CarrierConfig, DataFailCause, EpdgSelector, ErrorPolicyManager, IwlanError,
    Network, ProtoFilter, TunnelCallback, TunnelManagerDeps, TunnelSetupRequest,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    callback::DataServiceCallback,
    error::{Error, Result},
    tunnel_controller::{SlotContext, TunnelController},
    types::{ApnTypes, DataCallResponse, DataProfile, DataServiceResult},
    wifi_monitor::{NetworkMonitor, NetworkRequest, WifiMonitorEvent},
};

pub(crate) enum ControllerCall {
    BringUp(TunnelSetupRequest, Arc<dyn TunnelCallback>),
    Close(String, bool),
    UpdateNetwork(Option<Network>),
}

impl std::fmt::Debug for ControllerCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BringUp(request, _) => write!(f, "BringUp({request:?})"),
            Self::Close(apn, force_close) => write!(f, "Close({apn}, {force_close})"),
            Self::UpdateNetwork(network) => write!(f, "UpdateNetwork({network:?})"),
        }
    }
}

pub(crate) struct FakeTunnelController {
    pub accept_bringup: bool,
    pub calls_tx: mpsc::UnboundedSender<ControllerCall>,
}

impl TunnelController for FakeTunnelController {
    fn bring_up_tunnel(&self, request: TunnelSetupRequest, callback: Arc<dyn TunnelCallback>) -> bool {
        let _ = self.calls_tx.send(ControllerCall::BringUp(request, callback));
        self.accept_bringup
    }

    fn close_tunnel(&self, apn: &str, force_close: bool) -> bool {
        let _ = self
            .calls_tx
            .send(ControllerCall::Close(apn.to_owned(), force_close));
        true
    }

    fn update_network(&self, network: Option<Network>) {
        let _ = self.calls_tx.send(ControllerCall::UpdateNetwork(network));
    }
}

pub(crate) struct FakeErrorPolicy {
    pub outcome: Mutex<(DataFailCause, i64)>,
}

impl Default for FakeErrorPolicy {
    fn default() -> Self {
        Self {
            outcome: Mutex::new((DataFailCause::ERROR_UNSPECIFIED, -1)),
        }
    }
}

impl ErrorPolicyManager for FakeErrorPolicy {
    fn get_data_fail_cause(&self, _apn: &str) -> DataFailCause {
        self.outcome.lock().0
    }

    fn get_current_retry_time(&self, _apn: &str) -> i64 {
        self.outcome.lock().1
    }
}

pub(crate) fn slot_context(
    accept_bringup: bool,
) -> (
    SlotContext,
    Arc<FakeErrorPolicy>,
    mpsc::UnboundedReceiver<ControllerCall>,
) {
    let (calls_tx, calls_rx) = mpsc::unbounded_channel();
    let error_policy = Arc::new(FakeErrorPolicy::default());
    let context = SlotContext {
        tunnel_controller: Arc::new(FakeTunnelController {
            accept_bringup,
            calls_tx,
        }),
        error_policy: error_policy.clone(),
        shutdown_token: CancellationToken::new(),
    };
    (context, error_policy, calls_rx)
}

pub(crate) struct FakeEpdgSelector {
    pub servers: Vec<IpAddr>,
}

#[async_trait::async_trait]
impl EpdgSelector for FakeEpdgSelector {
    async fn get_validated_server_list(
        &self,
        _filter: ProtoFilter,
        _is_emergency: bool,
        _is_roaming: bool,
        _network: Option<Network>,
    ) -> Result<Vec<IpAddr>, IwlanError> {
        Ok(self.servers.clone())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionAction {
    Close,
    Kill,
}

struct FakeIkeSession {
    actions_tx: mpsc::UnboundedSender<SessionAction>,
}

impl IkeSession for FakeIkeSession {
    fn close(&mut self) {
        let _ = self.actions_tx.send(SessionAction::Close);
    }

    fn kill(&mut self) {
        let _ = self.actions_tx.send(SessionAction::Kill);
    }
}

pub(crate) struct CreatedSession {
    pub ike_params: IkeSessionParams,
    pub callback: IkeSessionCallback,
    pub actions_rx: mpsc::UnboundedReceiver<SessionAction>,
}

struct FakeIkeSessionFactory {
    created_tx: mpsc::UnboundedSender<CreatedSession>,
}

impl IkeSessionFactory for FakeIkeSessionFactory {
    fn create_ike_session(
        &self,
        ike_params: IkeSessionParams,
        _child_params: ChildSessionParams,
        callback: IkeSessionCallback,
    ) -> Box<dyn IkeSession> {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let _ = self.created_tx.send(CreatedSession {
            ike_params,
            callback,
            actions_rx,
        });
        Box::new(FakeIkeSession { actions_tx })
    }
}

/// Collaborators for a real tunnel manager whose selector always returns `servers`.
pub(crate) fn tunnel_manager_deps(
    servers: Vec<IpAddr>,
) -> (TunnelManagerDeps, mpsc::UnboundedReceiver<CreatedSession>) {
    let (created_tx, created_rx) = mpsc::unbounded_channel();
    let deps = TunnelManagerDeps {
        epdg_selector: Arc::new(FakeEpdgSelector { servers }),
        ike_session_factory: Arc::new(FakeIkeSessionFactory { created_tx }),
        error_policy: Arc::new(FakeErrorPolicy::default()),
        carrier_config: Arc::new(CarrierConfig::default()),
    };
    (deps, created_rx)
}

pub(crate) async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ModemEvent {
    SetupComplete(DataServiceResult, Option<DataCallResponse>),
    DeactivateComplete(DataServiceResult),
    DataCallList(DataServiceResult, Vec<DataCallResponse>),
}

pub(crate) struct FakeDataServiceCallback {
    events_tx: mpsc::UnboundedSender<ModemEvent>,
}

impl DataServiceCallback for FakeDataServiceCallback {
    fn on_setup_data_call_complete(
        &self,
        result: DataServiceResult,
        response: Option<DataCallResponse>,
    ) {
        let _ = self.events_tx.send(ModemEvent::SetupComplete(result, response));
    }

    fn on_deactivate_data_call_complete(&self, result: DataServiceResult) {
        let _ = self.events_tx.send(ModemEvent::DeactivateComplete(result));
    }

    fn on_request_data_call_list_complete(
        &self,
        result: DataServiceResult,
        data_call_list: Vec<DataCallResponse>,
    ) {
        let _ = self
            .events_tx
            .send(ModemEvent::DataCallList(result, data_call_list));
    }
}

pub(crate) fn data_service_callback() -> (
    Arc<dyn DataServiceCallback>,
    mpsc::UnboundedReceiver<ModemEvent>,
) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    (Arc::new(FakeDataServiceCallback { events_tx }), events_rx)
}

pub(crate) fn ims_profile() -> DataProfile {
    DataProfile {
        apn: "ims".to_owned(),
        protocol_type: ApnProtocol::Ipv4v6,
        roaming_protocol_type: ApnProtocol::Ipv6,
        supported_apn_types: ApnTypes::IMS,
    }
}

#[derive(Default)]
pub(crate) struct FakeNetworkMonitor {
    pub fail_registration: bool,
    pub registrations: Mutex<Vec<NetworkRequest>>,
    pub unregistrations: Mutex<usize>,
    pub event_tx: Mutex<Option<mpsc::UnboundedSender<WifiMonitorEvent>>>,
}

impl FakeNetworkMonitor {
    pub fn send(&self, event: WifiMonitorEvent) {
        let event_tx = self.event_tx.lock();
        event_tx
            .as_ref()
            .expect("no network callback registered")
            .send(event)
            .expect("wifi monitor is gone");
    }
}

impl NetworkMonitor for FakeNetworkMonitor {
    fn register_network_callback(
        &self,
        request: NetworkRequest,
        event_tx: mpsc::UnboundedSender<WifiMonitorEvent>,
    ) -> Result<()> {
        if self.fail_registration {
            return Err(Error::RegisterNetworkCallback {
                reason: "connectivity service unavailable".to_owned(),
            });
        }
        self.registrations.lock().push(request);
        *self.event_tx.lock() = Some(event_tx);
        Ok(())
    }

    fn unregister_network_callback(&self) {
        *self.unregistrations.lock() += 1;
        self.event_tx.lock().take();
    }
}

/// Pops the next recorded value, failing if nothing was recorded.
pub(crate) fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    rx.try_recv().expect("expected a recorded event")
}

pub(crate) fn assert_drained<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(value) = rx.try_recv() {
        panic!("unexpected event: {value:?}");
    }
}
