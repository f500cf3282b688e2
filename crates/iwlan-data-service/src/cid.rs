// Copyright 2024 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: GPL-3.0-only

/// Call id reported to the modem for an apn.
///
/// Polynomial hash with multiplier 31 over the UTF-16 code units of the name, so
/// the ids match those of the platform's string hash. Collisions between the few
/// apns active at once are not handled.
pub fn apn_to_cid(apn: &str) -> i32 {
    apn.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}
