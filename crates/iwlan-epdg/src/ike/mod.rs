// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

//! Seam between the tunnel manager and the IKEv2/IPsec stack.
//!
//! The stack itself is external: the manager only constructs sessions through
//! [`IkeSessionFactory`] and reacts to the lifecycle events delivered through the
//! [`IkeSessionCallback`] handed to the factory.

mod params;

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tokio::sync::mpsc;

pub use params::{
    ChildConfigRequest, ChildSessionParams, Ike3gppExtension, IkeConfigRequest, IkeSessionParams,
    TrafficSelector,
};

use crate::{error::IkeException, tunnel_manager::TunnelManagerCommand};

/// A live IKE session. Both methods eventually lead to a closed event on the callback.
pub trait IkeSession: Send {
    /// Graceful teardown with a delete exchange.
    fn close(&mut self);

    /// Immediate teardown without notifying the peer.
    fn kill(&mut self);
}

pub trait IkeSessionFactory: Send + Sync {
    fn create_ike_session(
        &self,
        ike_params: IkeSessionParams,
        child_params: ChildSessionParams,
        callback: IkeSessionCallback,
    ) -> Box<dyn IkeSession>;
}

/// Configuration negotiated for the child SA once the session is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildSessionConfiguration {
    pub internal_addresses: Vec<IpNetwork>,
    pub dns_servers: Vec<IpAddr>,
    pub pcscf_servers: Vec<IpAddr>,
    /// Name of the IPsec tunnel interface the transforms were applied to.
    pub iface_name: Option<String>,
}

#[derive(Debug)]
pub(crate) enum IkeSessionEvent {
    Opened(ChildSessionConfiguration),
    Closed,
    ClosedExceptionally(IkeException),
}

/// Delivers lifecycle events of one session back to its tunnel manager.
#[derive(Debug, Clone)]
pub struct IkeSessionCallback {
    apn: String,
    session_id: u64,
    command_tx: mpsc::UnboundedSender<TunnelManagerCommand>,
}

impl IkeSessionCallback {
    pub(crate) fn new(
        apn: String,
        session_id: u64,
        command_tx: mpsc::UnboundedSender<TunnelManagerCommand>,
    ) -> Self {
        Self {
            apn,
            session_id,
            command_tx,
        }
    }

    pub fn apn(&self) -> &str {
        &self.apn
    }

    pub fn on_opened(&self, config: ChildSessionConfiguration) {
        self.send(IkeSessionEvent::Opened(config));
    }

    pub fn on_closed(&self) {
        self.send(IkeSessionEvent::Closed);
    }

    pub fn on_closed_exceptionally(&self, exception: IkeException) {
        self.send(IkeSessionEvent::ClosedExceptionally(exception));
    }

    fn send(&self, event: IkeSessionEvent) {
        let command = TunnelManagerCommand::SessionEvent {
            apn: self.apn.clone(),
            session_id: self.session_id,
            event,
        };
        if self.command_tx.send(command).is_err() {
            tracing::warn!(
                "Dropping ike session event for {}, tunnel manager is gone",
                self.apn
            );
        }
    }
}
