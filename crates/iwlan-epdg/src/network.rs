// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

/// Opaque handle to an underlying platform network, e.g. the validated Wi-Fi network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    net_id: u64,
}

impl Network {
    pub fn new(net_id: u64) -> Self {
        Self { net_id }
    }

    pub fn net_id(&self) -> u64 {
        self.net_id
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network({})", self.net_id)
    }
}
