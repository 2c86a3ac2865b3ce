// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use poolmetrics_config::PoolMetricsConfig;
use prometheus::Registry;

use crate::{Error, MetricCollectorSet, registry::RegistryKey};

/// Holds the collector set of a registry, once it has been created
type Slot = Arc<Mutex<Option<Arc<MetricCollectorSet>>>>;

/// A map from registry to its [`MetricCollectorSet`]
///
/// Entries are created lazily and never evicted: registries are expected to
/// live as long as the process, and there are only a handful of them.
///
/// Each registry gets its own lock, held while its metrics are registered, so
/// that two pools racing on the same registry register the metrics once,
/// while pools on different registries don't wait on each other.
#[derive(Debug, Default)]
pub struct CollectorSetCache {
    slots: RwLock<HashMap<RegistryKey, Slot>>,
    created: AtomicUsize,
}

impl CollectorSetCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the collector set of the given registry, registering the metrics on
    /// it if this is the first time this registry is seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics could not be registered. Nothing is
    /// cached and nothing stays registered in that case, and the next call
    /// registers again from scratch. Whether that succeeds depends on the
    /// conflict being gone: see [`Error::DuplicateRegistration`].
    pub fn get_or_create(
        &self,
        registry: &Arc<Registry>,
        config: &PoolMetricsConfig,
    ) -> Result<Arc<MetricCollectorSet>, Error> {
        let slot = self.slot(RegistryKey::of(registry));
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(set) = &*slot {
            return Ok(set.clone());
        }

        let set = Arc::new(MetricCollectorSet::register(registry.clone(), config)?);
        *slot = Some(set.clone());
        self.created.fetch_add(1, Ordering::Relaxed);

        Ok(set)
    }

    fn slot(&self, key: RegistryKey) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return slot.clone();
        }

        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    /// Number of registries which have a collector set
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Returns `true` if no collector set was created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
