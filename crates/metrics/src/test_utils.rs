// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use prometheus::{Encoder as _, Registry, TextEncoder};

/// Render everything in the registry in the Prometheus text format
pub(crate) fn scrape(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics are not valid UTF-8")
}
