// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    collections::{HashMap, HashSet, VecDeque},
    net::IpAddr,
    sync::Arc,
};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    session_params::{child_session_params, ike_session_params, proto_filter},
    state::{EpdgSelectionState, PendingRequest, TunnelConfig, TunnelPhase},
    TunnelCallback, TunnelManagerCommand, TunnelManagerDeps,
};
use crate::{
    error::IwlanError,
    ike::{ChildSessionConfiguration, IkeSessionCallback, IkeSessionEvent},
    link_properties::TunnelLinkProperties,
    network::Network,
    request::TunnelSetupRequest,
};

/// Sole owner and mutator of a slot's tunnel table.
pub(super) struct TunnelManagerLoop {
    slot_index: u32,
    deps: TunnelManagerDeps,
    command_tx: mpsc::UnboundedSender<TunnelManagerCommand>,
    command_rx: mpsc::UnboundedReceiver<TunnelManagerCommand>,
    active_apns: Arc<RwLock<HashSet<String>>>,
    shutdown_token: CancellationToken,

    tunnels: HashMap<String, TunnelConfig>,
    pending_requests: VecDeque<PendingRequest>,
    selection: EpdgSelectionState,
    network: Option<Network>,
    next_session_id: u64,
    next_selection_id: u64,
}

impl TunnelManagerLoop {
    pub(super) fn new(
        slot_index: u32,
        deps: TunnelManagerDeps,
        command_tx: mpsc::UnboundedSender<TunnelManagerCommand>,
        command_rx: mpsc::UnboundedReceiver<TunnelManagerCommand>,
        active_apns: Arc<RwLock<HashSet<String>>>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            slot_index,
            deps,
            command_tx,
            command_rx,
            active_apns,
            shutdown_token,
            tunnels: HashMap::new(),
            pending_requests: VecDeque::new(),
            selection: EpdgSelectionState::default(),
            network: None,
            next_session_id: 0,
            next_selection_id: 0,
        }
    }

    pub(super) async fn run(mut self) {
        tracing::debug!("Starting tunnel manager for slot {}", self.slot_index);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::debug!("Tunnel manager for slot {} received shutdown", self.slot_index);
                    break;
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command);
                }
                else => break,
            }
        }

        self.shutdown();
        tracing::debug!("Tunnel manager for slot {} exited", self.slot_index);
    }

    fn handle_command(&mut self, command: TunnelManagerCommand) {
        match command {
            TunnelManagerCommand::BringUp { request, callback } => {
                self.handle_bring_up(request, callback)
            }
            TunnelManagerCommand::RejectBringUp { apn, callback } => {
                let error = self.deps.error_policy.get_last_error(&apn);
                tracing::info!("Rejecting bringup for {apn}: {error}");
                callback.on_closed(&apn, error);
            }
            TunnelManagerCommand::Close { apn, force_close } => {
                self.handle_close(&apn, force_close)
            }
            TunnelManagerCommand::UpdateNetwork(network) => {
                tracing::debug!("Underlying network updated: {:?}", network);
                self.network = network;
            }
            TunnelManagerCommand::Reset => self.handle_reset(),
            TunnelManagerCommand::SelectionComplete {
                selection_id,
                result,
            } => self.handle_selection_complete(selection_id, result),
            TunnelManagerCommand::SessionEvent {
                apn,
                session_id,
                event,
            } => self.handle_session_event(apn, session_id, event),
        }
    }

    fn is_known_apn(&self, apn: &str) -> bool {
        self.tunnels.contains_key(apn)
            || self
                .pending_requests
                .iter()
                .any(|pending| pending.request.apn_name() == apn)
            || self
                .selection
                .request
                .as_ref()
                .is_some_and(|pending| pending.request.apn_name() == apn)
    }

    fn handle_bring_up(&mut self, request: TunnelSetupRequest, callback: Arc<dyn TunnelCallback>) {
        let apn = request.apn_name().to_owned();
        if self.is_known_apn(&apn) {
            tracing::warn!("Ignoring duplicate bringup for {apn}");
            return;
        }

        tracing::info!(
            "Bringing up tunnel for {apn} ({}, emergency: {}, roaming: {})",
            request.apn_ip_protocol(),
            request.is_emergency(),
            request.is_roaming()
        );
        self.pending_requests
            .push_back(PendingRequest { request, callback });
        self.process_pending_requests();
        self.publish_active_apns();
    }

    fn process_pending_requests(&mut self) {
        if let Some(server) = self.selection.selected_address() {
            while let Some(pending) = self.pending_requests.pop_front() {
                self.create_session(pending, server, false);
            }
            return;
        }

        if self.selection.is_busy() {
            return;
        }

        if let Some(pending) = self.pending_requests.pop_front() {
            self.start_selection(pending);
        }
    }

    fn start_selection(&mut self, pending: PendingRequest) {
        let selection_id = self.next_selection_id;
        self.next_selection_id += 1;

        let request = &pending.request;
        let filter = proto_filter(request.apn_ip_protocol());
        let is_emergency = request.is_emergency();
        let is_roaming = request.is_roaming();
        let network = request.network().or(self.network);
        tracing::debug!(
            "Starting epdg selection {selection_id} for {} ({:?})",
            request.apn_name(),
            filter
        );

        self.selection.in_flight = Some(selection_id);
        self.selection.request = Some(pending);

        let epdg_selector = self.deps.epdg_selector.clone();
        let command_tx = self.command_tx.clone();
        let shutdown_token = self.shutdown_token.child_token();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown_token.cancelled() => return,
                result = epdg_selector.get_validated_server_list(filter, is_emergency, is_roaming, network) => result,
            };
            let command = TunnelManagerCommand::SelectionComplete {
                selection_id,
                result,
            };
            if command_tx.send(command).is_err() {
                tracing::debug!("Tunnel manager exited before epdg selection {selection_id} completed");
            }
        });
    }

    fn handle_selection_complete(
        &mut self,
        selection_id: u64,
        result: Result<Vec<IpAddr>, IwlanError>,
    ) {
        if self.selection.in_flight != Some(selection_id) {
            tracing::debug!("Ignoring stale epdg selection {selection_id}");
            return;
        }
        self.selection.in_flight = None;

        let Some(pending) = self.selection.request.take() else {
            tracing::debug!("Epdg selection {selection_id} completed after its request was closed");
            self.process_pending_requests();
            self.reset_if_idle();
            return;
        };

        match result {
            Ok(addresses) if !addresses.is_empty() => {
                tracing::info!(
                    "Validated epdg addresses for {}: {:?}",
                    pending.request.apn_name(),
                    addresses
                );
                let server = addresses[0];
                self.selection.validated_addresses = addresses;
                self.selection.index = 0;
                self.create_session(pending, server, true);
            }
            Ok(_) => self.fail_selection(pending, IwlanError::EpdgSelectorServerSelectionFailed),
            Err(error) => self.fail_selection(pending, error),
        }
        self.publish_active_apns();
    }

    fn fail_selection(&mut self, pending: PendingRequest, error: IwlanError) {
        let apn = pending.request.apn_name();
        tracing::warn!("Epdg selection failed for {apn}: {error}");
        self.deps.error_policy.report_iwlan_error(apn, &error);
        self.publish_active_apns();
        pending.callback.on_closed(apn, error);

        self.process_pending_requests();
        self.reset_if_idle();
    }

    fn create_session(&mut self, pending: PendingRequest, server: IpAddr, is_selection_attempt: bool) {
        let PendingRequest { request, callback } = pending;
        let apn = request.apn_name().to_owned();

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let timers = self
            .deps
            .carrier_config
            .carrier_config(self.slot_index)
            .session_timers();
        tracing::debug!("Session timers for {apn}: {timers}");

        let network = request.network().or(self.network);
        let ike_params = ike_session_params(&request, server, network, &timers);
        let child_params = child_session_params(&request, &timers);
        let session_callback = IkeSessionCallback::new(apn.clone(), session_id, self.command_tx.clone());

        tracing::info!("Creating ike session {session_id} for {apn} with epdg {server}");
        let session = self.deps.ike_session_factory.create_ike_session(
            ike_params,
            child_params,
            session_callback,
        );

        self.tunnels.insert(
            apn,
            TunnelConfig {
                session,
                session_id,
                request,
                callback,
                phase: TunnelPhase::Connecting,
                last_error: IwlanError::NoError,
                link_properties: None,
                is_selection_attempt,
            },
        );
    }

    fn handle_session_event(&mut self, apn: String, session_id: u64, event: IkeSessionEvent) {
        match self.tunnels.get(&apn) {
            Some(config) if config.session_id == session_id => {}
            Some(_) => {
                tracing::debug!("Ignoring event from replaced ike session {session_id} for {apn}");
                return;
            }
            None => {
                tracing::debug!("Ignoring event for unknown tunnel {apn}");
                return;
            }
        }

        match event {
            IkeSessionEvent::Opened(child_config) => self.handle_opened(&apn, child_config),
            IkeSessionEvent::Closed => self.handle_closed(&apn, IwlanError::NoError),
            IkeSessionEvent::ClosedExceptionally(exception) => {
                tracing::warn!("Ike session for {apn} closed exceptionally: {exception}");
                self.handle_closed(&apn, IwlanError::from(&exception));
            }
        }
    }

    fn handle_opened(&mut self, apn: &str, child_config: ChildSessionConfiguration) {
        let Some(config) = self.tunnels.get_mut(apn) else {
            return;
        };

        if config.phase == TunnelPhase::Closing {
            tracing::debug!("Tunnel for {apn} opened while closing");
            return;
        }

        let Some(iface_name) = child_config.iface_name else {
            tracing::error!("Failed to apply tunnel transforms for {apn}");
            config.last_error = IwlanError::TunnelTransformFailed;
            config.phase = TunnelPhase::Closing;
            config.session.kill();
            return;
        };

        let link_properties = TunnelLinkProperties {
            internal_addresses: child_config.internal_addresses,
            dns_addresses: child_config.dns_servers,
            pcscf_addresses: child_config.pcscf_servers,
            iface_name,
        };
        config.phase = TunnelPhase::Open;
        config.link_properties = Some(link_properties.clone());
        let callback = config.callback.clone();

        if std::mem::take(&mut config.is_selection_attempt) {
            self.selection.is_selected = true;
            if let Some(server) = self.selection.selected_address() {
                tracing::info!("Selected epdg {server}");
            }
        }

        tracing::info!("Tunnel for {apn} opened, {link_properties}");
        callback.on_opened(apn, link_properties);

        self.process_pending_requests();
        self.publish_active_apns();
    }

    fn handle_closed(&mut self, apn: &str, error: IwlanError) {
        let Some(config) = self.tunnels.remove(apn) else {
            return;
        };

        let is_selecting = config.is_selection_attempt && !self.selection.is_selected;
        if is_selecting && config.phase == TunnelPhase::Connecting {
            self.selection.index += 1;
            if let Some(server) = self.selection.current_candidate() {
                tracing::info!("Ike session for {apn} closed before opening ({error}), retrying with {server}");
                let pending = PendingRequest {
                    request: config.request,
                    callback: config.callback,
                };
                self.create_session(pending, server, true);
                return;
            }

            tracing::warn!("Exhausted all epdg candidates for {apn}");
            self.selection.validated_addresses.clear();
            self.selection.index = 0;
            self.report_closed(apn, config.callback, IwlanError::EpdgSelectorServerSelectionFailed);
            return;
        }

        if is_selecting {
            self.selection.validated_addresses.clear();
            self.selection.index = 0;
        }

        let error = if config.last_error.is_error() {
            config.last_error
        } else {
            error
        };
        tracing::info!(
            "Tunnel for {apn} on {} closed: {error}",
            config
                .link_properties
                .as_ref()
                .map_or("no interface", |props| props.iface_name.as_str())
        );
        self.report_closed(apn, config.callback, error);
    }

    fn report_closed(&mut self, apn: &str, callback: Arc<dyn TunnelCallback>, error: IwlanError) {
        self.deps.error_policy.report_iwlan_error(apn, &error);
        self.publish_active_apns();
        callback.on_closed(apn, error);

        self.process_pending_requests();
        self.reset_if_idle();
        self.publish_active_apns();
    }

    fn handle_close(&mut self, apn: &str, force_close: bool) {
        let (mut closed, remaining): (Vec<_>, Vec<_>) = self
            .pending_requests
            .drain(..)
            .partition(|pending| pending.request.apn_name() == apn);
        self.pending_requests = remaining.into();

        if self
            .selection
            .request
            .as_ref()
            .is_some_and(|pending| pending.request.apn_name() == apn)
        {
            closed.extend(self.selection.request.take());
        }

        match self.tunnels.get_mut(apn) {
            Some(config) => {
                tracing::info!("Closing tunnel for {apn}, force: {force_close}");
                config.phase = TunnelPhase::Closing;
                if force_close {
                    config.session.kill();
                } else {
                    config.session.close();
                }
            }
            None if closed.is_empty() => tracing::debug!("No tunnel to close for {apn}"),
            None => {}
        }

        self.publish_active_apns();
        for pending in closed {
            tracing::info!("Closing bringup for {apn} before it reached an epdg");
            pending.callback.on_closed(apn, IwlanError::NoError);
        }
    }

    fn handle_reset(&mut self) {
        tracing::info!("Resetting tunnel manager state for slot {}", self.slot_index);

        let selection = std::mem::take(&mut self.selection);
        let pending: Vec<_> = selection
            .request
            .into_iter()
            .chain(std::mem::take(&mut self.pending_requests))
            .collect();
        let tunnels = std::mem::take(&mut self.tunnels);
        self.publish_active_apns();

        for pending in pending {
            let apn = pending.request.apn_name();
            let error = IwlanError::EpdgSelectorServerSelectionFailed;
            self.deps.error_policy.report_iwlan_error(apn, &error);
            pending.callback.on_closed(apn, error);
        }
        for (apn, mut config) in tunnels {
            config.session.kill();
            config.callback.on_closed(&apn, IwlanError::NoError);
        }
    }

    fn reset_if_idle(&mut self) {
        if self.tunnels.is_empty()
            && self.pending_requests.is_empty()
            && self.selection.in_flight.is_none()
        {
            tracing::debug!("No tunnels left on slot {}, clearing epdg selection", self.slot_index);
            self.selection = EpdgSelectionState::default();
        }
    }

    fn publish_active_apns(&self) {
        let active = self
            .tunnels
            .keys()
            .cloned()
            .chain(
                self.pending_requests
                    .iter()
                    .map(|pending| pending.request.apn_name().to_owned()),
            )
            .chain(
                self.selection
                    .request
                    .iter()
                    .map(|pending| pending.request.apn_name().to_owned()),
            )
            .collect();
        *self.active_apns.write() = active;
    }

    fn shutdown(&mut self) {
        // Later sends fail, so callers see the loop is gone.
        self.command_rx.close();

        let mut unanswered = Vec::new();
        for (apn, mut config) in self.tunnels.drain() {
            tracing::debug!("Killing ike session for {apn} on shutdown");
            config.session.kill();
            unanswered.push((apn, config.callback));
        }
        let selection = std::mem::take(&mut self.selection);
        for pending in selection.request.into_iter().chain(self.pending_requests.drain(..)) {
            unanswered.push((pending.request.apn_name().to_owned(), pending.callback));
        }
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                TunnelManagerCommand::BringUp { request, callback } => {
                    unanswered.push((request.apn_name().to_owned(), callback));
                }
                TunnelManagerCommand::RejectBringUp { apn, callback } => {
                    unanswered.push((apn, callback));
                }
                _ => {}
            }
        }
        self.active_apns.write().clear();

        for (apn, callback) in unanswered {
            callback.on_closed(&apn, IwlanError::NoError);
        }
    }
}
