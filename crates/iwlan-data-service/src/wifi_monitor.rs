// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{collections::HashMap, sync::Arc};

use iwlan_epdg::Network;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{error::Result, provider::DataServiceProvider};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WifiState {
    pub connected: bool,
    pub network: Option<Network>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkCapability {
    TransportWifi,
    Internet,
    Validated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    pub capabilities: Vec<NetworkCapability>,
}

impl NetworkRequest {
    /// Validated Wi-Fi with internet access.
    pub fn validated_wifi() -> Self {
        Self {
            capabilities: vec![
                NetworkCapability::TransportWifi,
                NetworkCapability::Internet,
                NetworkCapability::Validated,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiMonitorEvent {
    Available(Network),
    Losing { network: Network, max_ms_to_live: u32 },
    Lost(Network),
    LinkPropertiesChanged(Network),
    BlockedStatusChanged { network: Network, blocked: bool },
}

/// Platform connectivity service delivering network callbacks.
pub trait NetworkMonitor: Send + Sync {
    fn register_network_callback(
        &self,
        request: NetworkRequest,
        event_tx: mpsc::UnboundedSender<WifiMonitorEvent>,
    ) -> Result<()>;

    fn unregister_network_callback(&self);
}

pub(crate) type ProviderRegistry = Arc<Mutex<HashMap<u32, Arc<DataServiceProvider>>>>;

pub(crate) struct WifiMonitorHandle {
    cancel_token: CancellationToken,
    _join_handle: JoinHandle<()>,
}

impl WifiMonitorHandle {
    pub(crate) fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

pub(crate) struct WifiMonitor {
    event_rx: mpsc::UnboundedReceiver<WifiMonitorEvent>,
    wifi_state_tx: Arc<watch::Sender<WifiState>>,
    providers: ProviderRegistry,
    cancel_token: CancellationToken,
}

impl WifiMonitor {
    pub(crate) fn start(
        event_rx: mpsc::UnboundedReceiver<WifiMonitorEvent>,
        wifi_state_tx: Arc<watch::Sender<WifiState>>,
        providers: ProviderRegistry,
        cancel_token: CancellationToken,
    ) -> WifiMonitorHandle {
        let monitor = Self {
            event_rx,
            wifi_state_tx,
            providers,
            cancel_token: cancel_token.clone(),
        };
        WifiMonitorHandle {
            cancel_token,
            _join_handle: tokio::spawn(monitor.run()),
        }
    }

    async fn run(mut self) {
        tracing::debug!("Wifi monitor started");
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                else => break,
            }
        }
        tracing::debug!("Wifi monitor exited");
    }

    fn providers(&self) -> Vec<Arc<DataServiceProvider>> {
        self.providers.lock().values().cloned().collect()
    }

    fn handle_event(&self, event: WifiMonitorEvent) {
        match event {
            WifiMonitorEvent::Available(network) => {
                tracing::info!("Wifi available on {network}");
                self.wifi_state_tx.send_replace(WifiState {
                    connected: true,
                    network: Some(network),
                });
                for provider in self.providers() {
                    provider.update_network(Some(network));
                }
            }
            WifiMonitorEvent::Lost(network) => {
                tracing::info!("Wifi lost on {network}");
                self.wifi_state_tx.send_replace(WifiState::default());
                for provider in self.providers() {
                    provider.force_close_tunnels_in_deactivating_state();
                }
            }
            WifiMonitorEvent::Losing {
                network,
                max_ms_to_live,
            } => {
                tracing::debug!("Wifi losing on {network}, {max_ms_to_live}ms to live");
            }
            WifiMonitorEvent::LinkPropertiesChanged(network) => {
                tracing::debug!("Link properties changed on {network}");
            }
            WifiMonitorEvent::BlockedStatusChanged { network, blocked } => {
                tracing::debug!("Blocked status on {network}: {blocked}");
            }
        }
    }
}
