// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use poolmetrics_config::PoolMetricsConfig;
use prometheus::Registry;

use crate::{CollectorSetCache, Error, PoolMetricsTracker, PoolStats, state::PoolStateCollector};

/// Creates the [`PoolMetricsTracker`] of each pool.
///
/// One factory should live as long as the process and be shared by
/// everything which creates pools: it remembers which registries already have
/// the connection pool metrics registered on them.
#[derive(Debug, Default)]
pub struct MetricsTrackerFactory {
    config: PoolMetricsConfig,
    collectors: CollectorSetCache,
}

impl MetricsTrackerFactory {
    /// Create a new factory with the given configuration.
    ///
    /// The configuration is not validated here. Invalid buckets are reported by
    /// the first [`MetricsTrackerFactory::create`] as
    /// [`Error::InvalidBuckets`], without touching the registry.
    #[must_use]
    pub fn new(config: PoolMetricsConfig) -> Self {
        Self {
            config,
            collectors: CollectorSetCache::new(),
        }
    }

    /// The configuration of this factory
    #[must_use]
    pub fn config(&self) -> &PoolMetricsConfig {
        &self.config
    }

    /// Number of registries the metrics were registered on
    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// Returns `true` if no tracker was created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Create the tracker of a pool reporting into the given registry.
    ///
    /// Pools sharing a name on the same registry report into the same series.
    ///
    /// Registries are told apart by their [`Arc`], not by the
    /// [`Registry`] it points to. Every pool reporting into one registry must
    /// be given a clone of the same `Arc`: wrapping clones of a [`Registry`]
    /// in separate `Arc`s makes the second pool register the metrics again,
    /// which fails with [`Error::DuplicateRegistration`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pool name is empty, if the configured buckets
    /// are invalid, or if the metrics could not be registered on the
    /// registry, most likely because a metric with the same name was
    /// registered by something else.
    pub fn create(
        &self,
        pool_name: &str,
        registry: &Arc<Registry>,
    ) -> Result<PoolMetricsTracker, Error> {
        self.build(pool_name, registry, None)
    }

    /// Same as [`MetricsTrackerFactory::create`], also reporting the state of
    /// the pool from the given source until the tracker is closed.
    ///
    /// # Errors
    ///
    /// Same as [`MetricsTrackerFactory::create`]. Failing to register the pool
    /// state is not an error: it is logged and the tracker is returned
    /// without it.
    pub fn create_with_stats(
        &self,
        pool_name: &str,
        registry: &Arc<Registry>,
        stats: Arc<dyn PoolStats>,
    ) -> Result<PoolMetricsTracker, Error> {
        self.build(pool_name, registry, Some(stats))
    }

    #[tracing::instrument(
        name = "pool_metrics.create_tracker",
        skip_all,
        fields(pool.name = pool_name),
        err,
    )]
    fn build(
        &self,
        pool_name: &str,
        registry: &Arc<Registry>,
        stats: Option<Arc<dyn PoolStats>>,
    ) -> Result<PoolMetricsTracker, Error> {
        if pool_name.is_empty() {
            return Err(Error::EmptyPoolName);
        }

        let collectors = self.collectors.get_or_create(registry, &self.config)?;
        let instruments = collectors.bind(pool_name)?;

        let state_collector = match stats {
            Some(stats) if self.config.pool_state => {
                self.register_state(registry, pool_name, stats)
            }
            Some(_) => {
                tracing::debug!("Pool state reporting is disabled, ignoring the pool statistics");
                None
            }
            None => None,
        };

        tracing::debug!(
            reports_state = state_collector.is_some(),
            "Created metrics tracker"
        );

        Ok(PoolMetricsTracker::new(
            pool_name.to_owned(),
            collectors,
            instruments,
            state_collector,
        ))
    }

    fn register_state(
        &self,
        registry: &Registry,
        pool_name: &str,
        stats: Arc<dyn PoolStats>,
    ) -> Option<PoolStateCollector> {
        let collector = match PoolStateCollector::new(
            &self.config.namespace,
            &self.config.pool_label,
            pool_name,
            stats,
        ) {
            Ok(collector) => collector,
            Err(e) => {
                tracing::warn!(
                    error = &e as &dyn std::error::Error,
                    "Failed to build the pool state metrics"
                );
                return None;
            }
        };

        // Another live pool with the same name may already report its state
        // on this registry. Its collector must stay, so this one is dropped.
        if let Err(e) = registry.register(Box::new(collector.clone())) {
            tracing::warn!(
                error = &e as &dyn std::error::Error,
                "Failed to register the pool state metrics, the pool state will not be reported"
            );
            return None;
        }

        Some(collector)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use assert_matches::assert_matches;
    use prometheus::IntCounter;

    use super::*;
    use crate::{MetricsTracker, test_utils::scrape};

    #[test]
    fn singleton_per_registry() {
        let factory = MetricsTrackerFactory::default();
        let registry = Arc::new(Registry::new());

        let a = factory.create("A", &registry).unwrap();
        let b = factory.create("B", &registry).unwrap();
        let c = factory.create("C", &registry).unwrap();

        assert_eq!(factory.len(), 1);
        assert!(Arc::ptr_eq(a.collectors(), b.collectors()));
        assert!(Arc::ptr_eq(b.collectors(), c.collectors()));

        // The four metrics, each with one series per pool
        assert_eq!(registry.gather().len(), 4);
    }

    #[test]
    fn empty_pool_name() {
        let factory = MetricsTrackerFactory::default();
        let registry = Arc::new(Registry::new());

        assert_matches!(factory.create("", &registry), Err(Error::EmptyPoolName));
        assert!(factory.is_empty());
    }

    #[test]
    fn duplicate_registration_is_reported() {
        let factory = MetricsTrackerFactory::default();
        let registry = Arc::new(Registry::new());
        let external =
            IntCounter::new("hikaricp_connection_acquired_nanos", "Registered elsewhere").unwrap();
        registry.register(Box::new(external)).unwrap();

        assert_matches!(
            factory.create("main", &registry),
            Err(Error::DuplicateRegistration { name }) if name == "hikaricp_connection_acquired_nanos"
        );
        assert!(factory.is_empty());

        // Still failing, nothing half-registered got cached
        assert_matches!(
            factory.create("main", &registry),
            Err(Error::DuplicateRegistration { .. })
        );
    }

    #[test]
    fn invalid_buckets_are_not_cached() {
        let mut config = PoolMetricsConfig::default();
        config.buckets.acquired_nanos = vec![5.0, 1.0];
        let factory = MetricsTrackerFactory::new(config);
        let registry = Arc::new(Registry::new());

        for _ in 0..2 {
            assert_matches!(
                factory.create("A", &registry),
                Err(Error::InvalidBuckets { name, .. }) if name == "hikaricp_connection_acquired_nanos"
            );
        }
        assert!(factory.is_empty());
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn registries_are_told_apart_by_arc() {
        let factory = MetricsTrackerFactory::default();
        let registry = Registry::new();
        let first = Arc::new(registry.clone());
        let second = Arc::new(registry);

        let _tracker = factory.create("A", &first).unwrap();
        assert!(factory.create("B", &first.clone()).is_ok());
        assert_matches!(
            factory.create("C", &second),
            Err(Error::DuplicateRegistration { name }) if name == "hikaricp_connection_timeout_count"
        );
    }

    #[test]
    fn concurrent_construction_race() {
        const POOLS: usize = 32;

        let factory = MetricsTrackerFactory::default();
        let registry = Arc::new(Registry::new());
        let barrier = Barrier::new(POOLS);

        let trackers: Vec<PoolMetricsTracker> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..POOLS)
                .map(|i| {
                    let (factory, registry, barrier) = (&factory, &registry, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        factory.create(&format!("pool-{i}"), registry)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread panicked").unwrap())
                .collect()
        });

        assert_eq!(factory.len(), 1);
        assert_eq!(registry.gather().len(), 4);
        assert!(
            trackers
                .iter()
                .all(|t| Arc::ptr_eq(t.collectors(), trackers[0].collectors()))
        );

        for tracker in &trackers {
            tracker.record_connection_timeout();
        }

        let counter = trackers[0].collectors().connection_timeout_counter();
        for i in 0..POOLS {
            let pool_name = format!("pool-{i}");
            assert_eq!(counter.with_label_values(&[pool_name.as_str()]).get(), 1);
        }

        let text = scrape(&registry);
        assert_eq!(
            text.lines()
                .filter(|line| line.starts_with("hikaricp_connection_timeout_count{"))
                .count(),
            POOLS
        );
    }

    #[test]
    fn distinct_registries_proceed_independently() {
        let factory = MetricsTrackerFactory::default();
        let registries: Vec<_> = (0..8).map(|_| Arc::new(Registry::new())).collect();

        std::thread::scope(|s| {
            for registry in &registries {
                let factory = &factory;
                s.spawn(move || {
                    factory.create("main", registry).unwrap().record_connection_timeout();
                });
            }
        });

        assert_eq!(factory.len(), registries.len());
    }
}
