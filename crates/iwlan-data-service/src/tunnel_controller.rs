// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use iwlan_epdg::{
    ErrorPolicyManager, Network, TunnelCallback, TunnelManager, TunnelManagerDeps,
    TunnelSetupRequest,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tunnel operations a data service provider drives.
pub trait TunnelController: Send + Sync {
    fn bring_up_tunnel(&self, request: TunnelSetupRequest, callback: Arc<dyn TunnelCallback>)
        -> bool;

    fn close_tunnel(&self, apn: &str, force_close: bool) -> bool;

    fn update_network(&self, network: Option<Network>);
}

impl TunnelController for TunnelManager {
    fn bring_up_tunnel(
        &self,
        request: TunnelSetupRequest,
        callback: Arc<dyn TunnelCallback>,
    ) -> bool {
        TunnelManager::bring_up_tunnel(self, request, callback)
    }

    fn close_tunnel(&self, apn: &str, force_close: bool) -> bool {
        TunnelManager::close_tunnel(self, apn, force_close)
    }

    fn update_network(&self, network: Option<Network>) {
        TunnelManager::update_network(self, network)
    }
}

/// Per slot collaborators of a data service provider.
#[derive(Clone)]
pub struct SlotContext {
    pub tunnel_controller: Arc<dyn TunnelController>,
    pub error_policy: Arc<dyn ErrorPolicyManager>,
    /// Cancelled when the slot's provider is removed.
    pub shutdown_token: CancellationToken,
}

pub trait SlotContextFactory: Send + Sync {
    fn create_slot_context(&self, slot_index: u32) -> SlotContext;
}

impl<F> SlotContextFactory for F
where
    F: Fn(u32) -> SlotContext + Send + Sync,
{
    fn create_slot_context(&self, slot_index: u32) -> SlotContext {
        self(slot_index)
    }
}

/// Spawns one tunnel manager per slot.
///
/// A manager that panics takes every manager of this factory down with it by
/// cancelling `shutdown_token`.
pub struct TunnelManagerFactory<F> {
    deps_for_slot: F,
    shutdown_token: CancellationToken,
}

impl<F> TunnelManagerFactory<F>
where
    F: Fn(u32) -> TunnelManagerDeps + Send + Sync,
{
    pub fn new(deps_for_slot: F, shutdown_token: CancellationToken) -> Self {
        Self {
            deps_for_slot,
            shutdown_token,
        }
    }
}

impl<F> SlotContextFactory for TunnelManagerFactory<F>
where
    F: Fn(u32) -> TunnelManagerDeps + Send + Sync,
{
    fn create_slot_context(&self, slot_index: u32) -> SlotContext {
        let deps = (self.deps_for_slot)(slot_index);
        let error_policy = deps.error_policy.clone();
        let slot_token = self.shutdown_token.child_token();
        let (manager, join_handle) = TunnelManager::spawn(slot_index, deps, slot_token.clone());
        tokio::spawn(supervise(slot_index, join_handle, self.shutdown_token.clone()));
        tracing::debug!("Spawned tunnel manager for slot {slot_index}");

        SlotContext {
            tunnel_controller: Arc::new(manager),
            error_policy,
            shutdown_token: slot_token,
        }
    }
}

async fn supervise(
    slot_index: u32,
    join_handle: JoinHandle<()>,
    shutdown_token: CancellationToken,
) {
    match join_handle.await {
        Ok(()) => tracing::debug!("Tunnel manager for slot {slot_index} stopped"),
        Err(error) if error.is_panic() => {
            tracing::error!(
                "Tunnel manager for slot {slot_index} panicked, shutting down all tunnel managers"
            );
            shutdown_token.cancel();
        }
        Err(error) => tracing::warn!("Tunnel manager for slot {slot_index} was aborted: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use std::{net::IpAddr, time::Duration};

    use iwlan_epdg::{ApnProtocol, IwlanError, TunnelLinkProperties};
    use tokio::sync::mpsc;

    use super::*;
    use crate::test_support::{recv, tunnel_manager_deps};

    struct ClosedRecorder(mpsc::UnboundedSender<IwlanError>);

    impl TunnelCallback for ClosedRecorder {
        fn on_opened(&self, _apn: &str, _link_properties: TunnelLinkProperties) {}

        fn on_closed(&self, _apn: &str, error: IwlanError) {
            let _ = self.0.send(error);
        }
    }

    struct PanicOnClose;

    impl TunnelCallback for PanicOnClose {
        fn on_opened(&self, _apn: &str, _link_properties: TunnelLinkProperties) {}

        fn on_closed(&self, apn: &str, error: IwlanError) {
            panic!("unexpected close for {apn}: {error}");
        }
    }

    fn ipv4_request(apn: &str) -> TunnelSetupRequest {
        TunnelSetupRequest::builder(apn)
            .apn_ip_protocol(ApnProtocol::Ipv4)
            .build()
    }

    fn factory_without_servers(
        shutdown_token: CancellationToken,
    ) -> TunnelManagerFactory<impl Fn(u32) -> TunnelManagerDeps + Send + Sync> {
        TunnelManagerFactory::new(
            |_slot_index| tunnel_manager_deps(Vec::<IpAddr>::new()).0,
            shutdown_token,
        )
    }

    #[tokio::test]
    async fn factory_spawns_a_manager_per_slot() {
        let factory = factory_without_servers(CancellationToken::new());

        let context = factory.create_slot_context(1);

        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
        assert!(context
            .tunnel_controller
            .bring_up_tunnel(ipv4_request("ims"), Arc::new(ClosedRecorder(closed_tx))));
        assert_eq!(
            recv(&mut closed_rx).await,
            IwlanError::EpdgSelectorServerSelectionFailed
        );
    }

    #[tokio::test]
    async fn cancelled_slot_refuses_bringups() {
        let shutdown_token = CancellationToken::new();
        let factory = factory_without_servers(shutdown_token.clone());
        let first = factory.create_slot_context(0);
        let second = factory.create_slot_context(1);

        first.shutdown_token.cancel();

        let (closed_tx, _closed_rx) = mpsc::unbounded_channel();
        let callback: Arc<dyn TunnelCallback> = Arc::new(ClosedRecorder(closed_tx));
        tokio::time::timeout(Duration::from_secs(5), async {
            for attempt in 0.. {
                let request = ipv4_request(&format!("apn{attempt}"));
                if !first.tunnel_controller.bring_up_tunnel(request, callback.clone()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stopped manager kept accepting bringups");

        assert!(!shutdown_token.is_cancelled());
        assert!(!second.shutdown_token.is_cancelled());
    }

    #[tokio::test]
    async fn panicking_manager_shuts_every_slot_down() {
        let shutdown_token = CancellationToken::new();
        let factory = factory_without_servers(shutdown_token.clone());
        let panicking = factory.create_slot_context(0);
        let other = factory.create_slot_context(1);

        // Selection fails and the close callback panics on the manager task.
        assert!(panicking
            .tunnel_controller
            .bring_up_tunnel(ipv4_request("ims"), Arc::new(PanicOnClose)));

        tokio::time::timeout(Duration::from_secs(5), shutdown_token.cancelled())
            .await
            .expect("panic was not escalated");
        assert!(other.shutdown_token.is_cancelled());

        let (closed_tx, _closed_rx) = mpsc::unbounded_channel();
        assert!(!panicking
            .tunnel_controller
            .bring_up_tunnel(ipv4_request("mms"), Arc::new(ClosedRecorder(closed_tx))));
    }
}
