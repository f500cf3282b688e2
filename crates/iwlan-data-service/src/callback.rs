// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

use crate::types::{DataCallResponse, DataServiceResult};

/// Completion callbacks towards the modem data call layer.
pub trait DataServiceCallback: Send + Sync {
    fn on_setup_data_call_complete(
        &self,
        _result: DataServiceResult,
        _response: Option<DataCallResponse>,
    ) {
    }

    fn on_deactivate_data_call_complete(&self, _result: DataServiceResult) {}

    fn on_request_data_call_list_complete(
        &self,
        _result: DataServiceResult,
        _data_call_list: Vec<DataCallResponse>,
    ) {
    }
}
