// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

mod event_loop;
mod session_params;
mod state;

use std::{collections::HashSet, net::IpAddr, sync::Arc};

use parking_lot::RwLock;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::CarrierConfigProvider,
    epdg_selector::EpdgSelector,
    error::IwlanError,
    error_policy::ErrorPolicyManager,
    ike::{IkeSessionEvent, IkeSessionFactory},
    link_properties::TunnelLinkProperties,
    network::Network,
    request::{TunnelSetupRequest, MAX_PDU_SESSION_ID},
};

use event_loop::TunnelManagerLoop;

/// Receives the lifecycle of one APN's tunnel.
pub trait TunnelCallback: Send + Sync {
    fn on_opened(&self, apn: &str, link_properties: TunnelLinkProperties);

    /// Terminal event, delivered exactly once per accepted bringup.
    fn on_closed(&self, apn: &str, error: IwlanError);
}

/// External collaborators used by a tunnel manager.
#[derive(Clone)]
pub struct TunnelManagerDeps {
    pub epdg_selector: Arc<dyn EpdgSelector>,
    pub ike_session_factory: Arc<dyn IkeSessionFactory>,
    pub error_policy: Arc<dyn ErrorPolicyManager>,
    pub carrier_config: Arc<dyn CarrierConfigProvider>,
}

pub(crate) enum TunnelManagerCommand {
    BringUp {
        request: TunnelSetupRequest,
        callback: Arc<dyn TunnelCallback>,
    },
    RejectBringUp {
        apn: String,
        callback: Arc<dyn TunnelCallback>,
    },
    Close {
        apn: String,
        force_close: bool,
    },
    UpdateNetwork(Option<Network>),
    Reset,
    SelectionComplete {
        selection_id: u64,
        result: Result<Vec<IpAddr>, IwlanError>,
    },
    SessionEvent {
        apn: String,
        session_id: u64,
        event: IkeSessionEvent,
    },
}

/// Handle to the per slot tunnel manager.
///
/// Every method validates synchronously and posts the actual work to the manager's
/// event loop, which is the only owner of the tunnel table.
#[derive(Clone)]
pub struct TunnelManager {
    slot_index: u32,
    command_tx: mpsc::UnboundedSender<TunnelManagerCommand>,
    active_apns: Arc<RwLock<HashSet<String>>>,
    error_policy: Arc<dyn ErrorPolicyManager>,
}

impl TunnelManager {
    pub fn spawn(
        slot_index: u32,
        deps: TunnelManagerDeps,
        shutdown_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let active_apns = Arc::new(RwLock::new(HashSet::new()));
        let error_policy = deps.error_policy.clone();

        let event_loop = TunnelManagerLoop::new(
            slot_index,
            deps,
            command_tx.clone(),
            command_rx,
            active_apns.clone(),
            shutdown_token,
        );
        let join_handle = tokio::spawn(event_loop.run());

        (
            Self {
                slot_index,
                command_tx,
                active_apns,
                error_policy,
            },
            join_handle,
        )
    }

    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }

    /// Returns `false` if the request is rejected outright or the event loop is gone.
    /// Any accepted request is eventually answered through `callback`.
    pub fn bring_up_tunnel(
        &self,
        request: TunnelSetupRequest,
        callback: Arc<dyn TunnelCallback>,
    ) -> bool {
        let apn = request.apn_name();
        if apn.is_empty() {
            tracing::error!("Bringup request without an apn name");
            return false;
        }

        if !request.apn_ip_protocol().is_tunnelable() {
            tracing::error!(
                "Unsupported protocol {} for {apn}",
                request.apn_ip_protocol()
            );
            return false;
        }

        if !(0..=i32::from(MAX_PDU_SESSION_ID)).contains(&request.pdu_session_id()) {
            tracing::error!(
                "Invalid pdu session id {} for {apn}",
                request.pdu_session_id()
            );
            return false;
        }

        if self.active_apns.read().contains(apn) {
            tracing::error!("Tunnel for {apn} already exists");
            return false;
        }

        let command = if self.error_policy.can_bring_up_tunnel(apn) {
            TunnelManagerCommand::BringUp { request, callback }
        } else {
            tracing::info!("Error policy does not allow a bringup for {apn} yet");
            TunnelManagerCommand::RejectBringUp {
                apn: apn.to_owned(),
                callback,
            }
        };
        self.send(command)
    }

    /// Returns `false` once the event loop is gone.
    pub fn close_tunnel(&self, apn: &str, force_close: bool) -> bool {
        self.send(TunnelManagerCommand::Close {
            apn: apn.to_owned(),
            force_close,
        })
    }

    pub fn update_network(&self, network: Option<Network>) {
        self.send(TunnelManagerCommand::UpdateNetwork(network));
    }

    /// Drops the selected ePDG address, pending requests and live tunnels.
    pub fn reset_tunnel_manager_state(&self) {
        self.send(TunnelManagerCommand::Reset);
    }

    /// Apns that currently own a tunnel, as last published by the event loop.
    pub fn active_apns(&self) -> Vec<String> {
        self.active_apns.read().iter().cloned().collect()
    }

    fn send(&self, command: TunnelManagerCommand) -> bool {
        if self.command_tx.send(command).is_err() {
            tracing::error!(
                "Tunnel manager for slot {} is no longer running",
                self.slot_index
            );
            return false;
        }
        true
    }
}
