// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use prometheus::{
    IntGauge, Opts,
    core::{Collector, Desc},
    proto::MetricFamily,
};

/// Point-in-time state of a connection pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Connections currently borrowed from the pool
    pub active_connections: u32,

    /// Connections open and available in the pool
    pub idle_connections: u32,

    /// Callers currently waiting for a connection
    pub pending_threads: u32,

    /// All connections currently open, active or idle
    pub total_connections: u32,

    /// Maximum number of connections the pool may open
    pub max_connections: u32,

    /// Number of idle connections the pool tries to keep open
    pub min_connections: u32,
}

/// A source of [`PoolStatsSnapshot`], implemented by connection pools which
/// want their state reported alongside their timings.
///
/// The snapshot is taken each time the registry is gathered, so it should be
/// cheap to produce.
pub trait PoolStats: Send + Sync {
    /// Take a snapshot of the current state of the pool
    fn snapshot(&self) -> PoolStatsSnapshot;
}

impl<F> PoolStats for F
where
    F: Fn() -> PoolStatsSnapshot + Send + Sync,
{
    fn snapshot(&self) -> PoolStatsSnapshot {
        self()
    }
}

struct Gauges {
    active: IntGauge,
    idle: IntGauge,
    pending: IntGauge,
    total: IntGauge,
    max: IntGauge,
    min: IntGauge,
}

impl Gauges {
    fn all(&self) -> [&IntGauge; 6] {
        [
            &self.active,
            &self.idle,
            &self.pending,
            &self.total,
            &self.max,
            &self.min,
        ]
    }

    fn update(&self, snapshot: PoolStatsSnapshot) {
        self.active.set(snapshot.active_connections.into());
        self.idle.set(snapshot.idle_connections.into());
        self.pending.set(snapshot.pending_threads.into());
        self.total.set(snapshot.total_connections.into());
        self.max.set(snapshot.max_connections.into());
        self.min.set(snapshot.min_connections.into());
    }
}

/// A [`Collector`] reporting the state of a single pool.
///
/// Unlike the timing metrics, which are shared by every pool of a registry,
/// one of these is registered per pool, with the pool name as a constant
/// label. It is what a tracker unregisters when it is closed.
#[derive(Clone)]
pub(crate) struct PoolStateCollector {
    gauges: Arc<Gauges>,
    stats: Arc<dyn PoolStats>,
}

impl PoolStateCollector {
    pub(crate) fn new(
        namespace: &str,
        pool_label: &str,
        pool_name: &str,
        stats: Arc<dyn PoolStats>,
    ) -> Result<Self, prometheus::Error> {
        let gauge = |name: &str, help: &str| {
            IntGauge::with_opts(
                Opts::new(format!("{namespace}_{name}"), help).const_label(pool_label, pool_name),
            )
        };

        let gauges = Gauges {
            active: gauge("active_connections", "Active connections")?,
            idle: gauge("idle_connections", "Idle connections")?,
            pending: gauge("pending_threads", "Pending threads")?,
            total: gauge("connections", "The number of connections")?,
            max: gauge("max_connections", "Max connections")?,
            min: gauge("min_connections", "Min connections")?,
        };

        Ok(Self {
            gauges: Arc::new(gauges),
            stats,
        })
    }
}

impl Collector for PoolStateCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges
            .all()
            .into_iter()
            .flat_map(Collector::desc)
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauges.update(self.stats.snapshot());

        self.gauges
            .all()
            .into_iter()
            .flat_map(Collector::collect)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use prometheus::Registry;

    use super::*;

    #[test]
    fn report_pool_state_at_each_gather() {
        let active = Arc::new(AtomicU32::new(3));
        let stats = {
            let active = active.clone();
            move || PoolStatsSnapshot {
                active_connections: active.load(Ordering::Relaxed),
                idle_connections: 2,
                pending_threads: 1,
                total_connections: 5,
                max_connections: 10,
                min_connections: 2,
            }
        };

        let collector =
            PoolStateCollector::new("hikaricp", "pool", "main", Arc::new(stats)).unwrap();
        let registry = Registry::new();
        registry.register(Box::new(collector)).unwrap();

        let text = crate::test_utils::scrape(&registry);
        assert!(text.contains(r#"hikaricp_active_connections{pool="main"} 3"#));
        assert!(text.contains(r#"hikaricp_idle_connections{pool="main"} 2"#));
        assert!(text.contains(r#"hikaricp_pending_threads{pool="main"} 1"#));
        assert!(text.contains(r#"hikaricp_connections{pool="main"} 5"#));
        assert!(text.contains(r#"hikaricp_max_connections{pool="main"} 10"#));
        assert!(text.contains(r#"hikaricp_min_connections{pool="main"} 2"#));

        active.store(7, Ordering::Relaxed);
        let text = crate::test_utils::scrape(&registry);
        assert!(text.contains(r#"hikaricp_active_connections{pool="main"} 7"#));
    }

    #[test]
    fn one_collector_per_pool_name() {
        let registry = Registry::new();
        let stats: Arc<dyn PoolStats> = Arc::new(PoolStatsSnapshot::default);

        let a = PoolStateCollector::new("hikaricp", "pool", "a", stats.clone()).unwrap();
        let b = PoolStateCollector::new("hikaricp", "pool", "b", stats.clone()).unwrap();
        let a_again = PoolStateCollector::new("hikaricp", "pool", "a", stats).unwrap();

        registry.register(Box::new(a)).unwrap();
        registry.register(Box::new(b)).unwrap();
        assert!(matches!(
            registry.register(Box::new(a_again)),
            Err(prometheus::Error::AlreadyReg)
        ));
    }
}
