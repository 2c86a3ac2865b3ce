// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use prometheus::Registry;

/// Identity of a shared [`Registry`] handle.
///
/// Two keys are equal only if they were taken from clones of the same
/// [`Arc`]. The key is only meaningful while something keeps that [`Arc`]
/// alive, which the collector set of the registry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegistryKey(usize);

impl RegistryKey {
    pub(crate) fn of(registry: &Arc<Registry>) -> Self {
        Self(Arc::as_ptr(registry).addr())
    }
}
