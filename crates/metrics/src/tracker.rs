// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{MetricCollectorSet, collectors::PoolInstruments, state::PoolStateCollector};

fn saturating_u64(value: u128) -> u64 {
    value.try_into().unwrap_or(u64::MAX)
}

/// Receives the events of a connection pool.
///
/// Every method has an empty default implementation, and none of them can
/// fail: reporting metrics must never get in the way of the pool.
pub trait MetricsTracker: Send + Sync {
    /// Record the time a caller waited to acquire a connection, in nanoseconds
    fn record_connection_acquired_nanos(&self, _elapsed_nanos: u64) {}

    /// Record the time a connection was borrowed from the pool, in
    /// milliseconds
    fn record_connection_usage_millis(&self, _elapsed_millis: u64) {}

    /// Record the time it took to open a new connection, in milliseconds
    fn record_connection_created_millis(&self, _elapsed_millis: u64) {}

    /// Record a caller giving up on acquiring a connection
    fn record_connection_timeout(&self) {}

    /// Stop reporting for this pool
    fn close(&self) {}

    /// Same as [`MetricsTracker::record_connection_acquired_nanos`], from a
    /// [`Duration`]
    fn record_connection_acquired(&self, elapsed: Duration) {
        self.record_connection_acquired_nanos(saturating_u64(elapsed.as_nanos()));
    }

    /// Same as [`MetricsTracker::record_connection_usage_millis`], from a
    /// [`Duration`]
    fn record_connection_usage(&self, elapsed: Duration) {
        self.record_connection_usage_millis(saturating_u64(elapsed.as_millis()));
    }

    /// Same as [`MetricsTracker::record_connection_created_millis`], from a
    /// [`Duration`]
    fn record_connection_created(&self, elapsed: Duration) {
        self.record_connection_created_millis(saturating_u64(elapsed.as_millis()));
    }
}

/// A [`MetricsTracker`] which ignores everything, for pools running without
/// metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsTracker;

impl MetricsTracker for NoopMetricsTracker {}

/// Reports the events of one pool into a Prometheus registry.
///
/// Created by [`MetricsTrackerFactory`](crate::MetricsTrackerFactory). The
/// tracker is closed when dropped.
pub struct PoolMetricsTracker {
    pool_name: String,
    collectors: Arc<MetricCollectorSet>,
    instruments: PoolInstruments,
    state_collector: Option<PoolStateCollector>,
    closed: AtomicBool,
}

impl std::fmt::Debug for PoolMetricsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMetricsTracker")
            .field("pool_name", &self.pool_name)
            .field("reports_state", &self.state_collector.is_some())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl PoolMetricsTracker {
    pub(crate) fn new(
        pool_name: String,
        collectors: Arc<MetricCollectorSet>,
        instruments: PoolInstruments,
        state_collector: Option<PoolStateCollector>,
    ) -> Self {
        Self {
            pool_name,
            collectors,
            instruments,
            state_collector,
            closed: AtomicBool::new(false),
        }
    }

    /// The name of the pool, as used in the metric labels
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// The metrics this tracker reports into, shared with every other pool of
    /// the same registry
    #[must_use]
    pub fn collectors(&self) -> &Arc<MetricCollectorSet> {
        &self.collectors
    }

    /// Returns `true` if the pool state gauges of this tracker are registered
    #[must_use]
    pub fn reports_state(&self) -> bool {
        self.state_collector.is_some()
    }

    /// Returns `true` once [`MetricsTracker::close`] was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// Timings stay well below 2^53, where u64 to f64 starts losing precision
#[allow(clippy::cast_precision_loss)]
impl MetricsTracker for PoolMetricsTracker {
    fn record_connection_acquired_nanos(&self, elapsed_nanos: u64) {
        if !self.is_closed() {
            self.instruments
                .elapsed_acquired
                .observe(elapsed_nanos as f64);
        }
    }

    fn record_connection_usage_millis(&self, elapsed_millis: u64) {
        if !self.is_closed() {
            self.instruments
                .elapsed_borrowed
                .observe(elapsed_millis as f64);
        }
    }

    fn record_connection_created_millis(&self, elapsed_millis: u64) {
        if !self.is_closed() {
            self.instruments
                .elapsed_creation
                .observe(elapsed_millis as f64);
        }
    }

    fn record_connection_timeout(&self) {
        if !self.is_closed() {
            self.instruments.connection_timeout.inc();
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(pool.name = %self.pool_name, "Metrics tracker already closed");
            return;
        }

        if let Some(collector) = &self.state_collector
            && let Err(e) = self
                .collectors
                .registry()
                .unregister(Box::new(collector.clone()))
        {
            tracing::warn!(
                pool.name = %self.pool_name,
                error = &e as &dyn std::error::Error,
                "Failed to unregister the pool state metrics"
            );
        }

        tracing::debug!(pool.name = %self.pool_name, "Closed metrics tracker");
    }
}

impl Drop for PoolMetricsTracker {
    fn drop(&mut self) {
        self.close();
    }
}
