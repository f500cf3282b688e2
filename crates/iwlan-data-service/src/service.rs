// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    provider::DataServiceProvider,
    tunnel_controller::SlotContextFactory,
    wifi_monitor::{
        NetworkMonitor, NetworkRequest, ProviderRegistry, WifiMonitor, WifiMonitorHandle,
        WifiState,
    },
};

pub(crate) struct DataServiceInner {
    slot_context_factory: Arc<dyn SlotContextFactory>,
    network_monitor: Arc<dyn NetworkMonitor>,
    providers: ProviderRegistry,
    wifi_state_tx: Arc<watch::Sender<WifiState>>,
    wifi_monitor: Mutex<Option<WifiMonitorHandle>>,
    shutdown_token: CancellationToken,
}

impl DataServiceInner {
    fn get_or_create_provider(self: &Arc<Self>, slot_index: u32) -> Result<Arc<DataServiceProvider>> {
        let mut providers = self.providers.lock();
        if let Some(provider) = providers.get(&slot_index) {
            return Ok(provider.clone());
        }
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutDown);
        }

        if providers.is_empty() {
            self.start_wifi_monitor()?;
        }

        let slot_context = self.slot_context_factory.create_slot_context(slot_index);
        let provider = Arc::new(DataServiceProvider::new(
            slot_index,
            slot_context,
            self.wifi_state_tx.subscribe(),
            Arc::downgrade(self),
        ));
        providers.insert(slot_index, provider.clone());
        tracing::info!("Created data service provider for slot {slot_index}");

        Ok(provider)
    }

    pub(crate) fn remove_provider(&self, slot_index: u32) {
        let mut providers = self.providers.lock();
        let Some(provider) = providers.remove(&slot_index) else {
            tracing::debug!("No data service provider for slot {slot_index}");
            return;
        };
        provider.shutdown();
        tracing::info!("Removed data service provider for slot {slot_index}");

        if providers.is_empty() {
            self.stop_wifi_monitor();
        }
    }

    fn start_wifi_monitor(&self) -> Result<()> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.network_monitor
            .register_network_callback(NetworkRequest::validated_wifi(), event_tx)?;

        let handle = WifiMonitor::start(
            event_rx,
            self.wifi_state_tx.clone(),
            self.providers.clone(),
            self.shutdown_token.child_token(),
        );
        *self.wifi_monitor.lock() = Some(handle);
        Ok(())
    }

    fn stop_wifi_monitor(&self) {
        if let Some(handle) = self.wifi_monitor.lock().take() {
            self.network_monitor.unregister_network_callback();
            handle.cancel();
        }
    }
}

/// Process wide registry of data service providers, one per SIM slot, sharing a
/// single Wi-Fi monitor.
#[derive(Clone)]
pub struct DataService {
    inner: Arc<DataServiceInner>,
}

impl DataService {
    pub fn new(
        slot_context_factory: Arc<dyn SlotContextFactory>,
        network_monitor: Arc<dyn NetworkMonitor>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (wifi_state_tx, _) = watch::channel(WifiState::default());
        Self {
            inner: Arc::new(DataServiceInner {
                slot_context_factory,
                network_monitor,
                providers: Arc::new(Mutex::new(HashMap::new())),
                wifi_state_tx: Arc::new(wifi_state_tx),
                wifi_monitor: Mutex::new(None),
                shutdown_token,
            }),
        }
    }

    /// Returns the provider for `slot_index`, creating it on first demand. The first
    /// provider starts the Wi-Fi monitor.
    pub fn get_or_create_provider(&self, slot_index: u32) -> Result<Arc<DataServiceProvider>> {
        self.inner.get_or_create_provider(slot_index)
    }

    pub fn provider(&self, slot_index: u32) -> Option<Arc<DataServiceProvider>> {
        self.inner.providers.lock().get(&slot_index).cloned()
    }

    /// Removes the provider for `slot_index`. Removing the last one stops the Wi-Fi monitor.
    pub fn remove_provider(&self, slot_index: u32) {
        self.inner.remove_provider(slot_index);
    }

    pub fn is_wifi_connected(&self) -> bool {
        self.inner.wifi_state_tx.borrow().connected
    }

    pub fn wifi_state(&self) -> WifiState {
        *self.inner.wifi_state_tx.borrow()
    }

    pub fn subscribe_wifi_state(&self) -> watch::Receiver<WifiState> {
        self.inner.wifi_state_tx.subscribe()
    }

    pub fn shutdown(&self) {
        tracing::info!("Shutting down data service");
        self.inner.shutdown_token.cancel();
        let providers: Vec<_> = self.inner.providers.lock().keys().copied().collect();
        for slot_index in providers {
            self.inner.remove_provider(slot_index);
        }
    }
}
