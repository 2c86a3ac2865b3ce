// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use poolmetrics_config::PoolMetricsConfig;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    core::Collector,
};

use crate::Error;

pub(crate) const TIMEOUT_HELP: &str = "Connection timeout count";
pub(crate) const ACQUIRED_HELP: &str = "Connection acquired time (ns)";
pub(crate) const BORROWED_HELP: &str = "Connection usage (ms)";
pub(crate) const CREATION_HELP: &str = "Connection creation (ms)";

/// Registers collectors on a registry, unregistering all of them again if
/// the registration is dropped before being committed.
struct Registration<'a> {
    registry: &'a Registry,
    registered: Vec<Box<dyn Collector>>,
}

impl<'a> Registration<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            registered: Vec::with_capacity(4),
        }
    }

    fn register<C>(&mut self, name: &str, collector: C) -> Result<C, Error>
    where
        C: Collector + Clone + 'static,
    {
        self.registry
            .register(Box::new(collector.clone()))
            .map_err(|e| Error::registration(name, e))?;

        self.registered.push(Box::new(collector.clone()));
        Ok(collector)
    }

    fn commit(mut self) {
        self.registered.clear();
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        for collector in self.registered.drain(..) {
            if let Err(e) = self.registry.unregister(collector) {
                tracing::warn!(
                    error = &e as &dyn std::error::Error,
                    "Failed to roll back a metric registration"
                );
            }
        }
    }
}

/// The label-bound handles of one pool
#[derive(Clone)]
pub(crate) struct PoolInstruments {
    pub connection_timeout: IntCounter,
    pub elapsed_acquired: Histogram,
    pub elapsed_borrowed: Histogram,
    pub elapsed_creation: Histogram,
}

/// The metrics shared by every pool reporting into one registry
///
/// Each metric is labeled by pool name. Exactly one set exists per registry,
/// see [`CollectorSetCache`](crate::CollectorSetCache).
pub struct MetricCollectorSet {
    registry: Arc<Registry>,
    connection_timeout_counter: IntCounterVec,
    elapsed_acquired_summary: HistogramVec,
    elapsed_borrowed_summary: HistogramVec,
    elapsed_creation_summary: HistogramVec,
}

impl std::fmt::Debug for MetricCollectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricCollectorSet")
            .field("connection_timeout_counter", &self.timeout_name())
            .finish_non_exhaustive()
    }
}

impl MetricCollectorSet {
    /// Build the metrics and register all of them on the given registry.
    ///
    /// Either every metric ends up registered, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRegistration`] if one of the metric names is
    /// already taken on this registry, and [`Error::InvalidBuckets`] if the
    /// configured buckets are rejected. Buckets are checked before anything
    /// is registered.
    pub(crate) fn register(
        registry: Arc<Registry>,
        config: &PoolMetricsConfig,
    ) -> Result<Self, Error> {
        let namespace = &config.namespace;
        let labels = [config.pool_label.as_str()];

        let timeout_name = format!("{namespace}_connection_timeout_count");
        let acquired_name = format!("{namespace}_connection_acquired_nanos");
        let borrowed_name = format!("{namespace}_connection_usage_millis");
        let creation_name = format!("{namespace}_connection_creation_millis");

        let connection_timeout_counter = IntCounterVec::new(
            Opts::new(timeout_name.as_str(), TIMEOUT_HELP),
            &labels,
        )
        .map_err(|e| Error::registration(&timeout_name, e))?;

        // The vec only checks its buckets when a child is created, so a
        // standalone histogram is built first to check them upfront
        let histogram = |name: &str, help: &str, buckets: &[f64]| {
            let opts = HistogramOpts::new(name, help).buckets(buckets.to_vec());
            Histogram::with_opts(opts.clone()).map_err(|source| Error::InvalidBuckets {
                name: name.to_owned(),
                source,
            })?;
            HistogramVec::new(opts, &labels).map_err(|e| Error::registration(name, e))
        };

        let elapsed_acquired_summary = histogram(
            &acquired_name,
            ACQUIRED_HELP,
            config.buckets.acquired_nanos.as_slice(),
        )?;
        let elapsed_borrowed_summary = histogram(
            &borrowed_name,
            BORROWED_HELP,
            config.buckets.usage_millis.as_slice(),
        )?;
        let elapsed_creation_summary = histogram(
            &creation_name,
            CREATION_HELP,
            config.buckets.creation_millis.as_slice(),
        )?;

        let mut registration = Registration::new(&registry);
        let connection_timeout_counter =
            registration.register(&timeout_name, connection_timeout_counter)?;
        let elapsed_acquired_summary =
            registration.register(&acquired_name, elapsed_acquired_summary)?;
        let elapsed_borrowed_summary =
            registration.register(&borrowed_name, elapsed_borrowed_summary)?;
        let elapsed_creation_summary =
            registration.register(&creation_name, elapsed_creation_summary)?;
        registration.commit();

        tracing::debug!(%namespace, "Registered connection pool metrics on a new registry");

        Ok(Self {
            registry,
            connection_timeout_counter,
            elapsed_acquired_summary,
            elapsed_borrowed_summary,
            elapsed_creation_summary,
        })
    }

    /// The registry these metrics are registered on
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Count of connection timeouts, per pool
    #[must_use]
    pub fn connection_timeout_counter(&self) -> &IntCounterVec {
        &self.connection_timeout_counter
    }

    /// Time spent acquiring a connection in nanoseconds, per pool
    #[must_use]
    pub fn elapsed_acquired_summary(&self) -> &HistogramVec {
        &self.elapsed_acquired_summary
    }

    /// Time a connection was borrowed in milliseconds, per pool
    #[must_use]
    pub fn elapsed_borrowed_summary(&self) -> &HistogramVec {
        &self.elapsed_borrowed_summary
    }

    /// Time spent creating a connection in milliseconds, per pool
    #[must_use]
    pub fn elapsed_creation_summary(&self) -> &HistogramVec {
        &self.elapsed_creation_summary
    }

    fn timeout_name(&self) -> Option<&str> {
        self.connection_timeout_counter
            .desc()
            .into_iter()
            .next()
            .map(|desc| desc.fq_name.as_str())
    }

    /// Get the handles of every metric for the given pool, creating them if
    /// needed.
    pub(crate) fn bind(&self, pool_name: &str) -> Result<PoolInstruments, Error> {
        fn bind_one<T>(
            vec: &prometheus::core::MetricVec<T>,
            pool_name: &str,
        ) -> Result<T::M, Error>
        where
            T: prometheus::core::MetricVecBuilder,
        {
            vec.get_metric_with_label_values(&[pool_name])
                .map_err(|source| Error::LabelBinding {
                    name: vec
                        .desc()
                        .first()
                        .map(|desc| desc.fq_name.clone())
                        .unwrap_or_default(),
                    pool: pool_name.to_owned(),
                    source,
                })
        }

        Ok(PoolInstruments {
            connection_timeout: bind_one(&self.connection_timeout_counter, pool_name)?,
            elapsed_acquired: bind_one(&self.elapsed_acquired_summary, pool_name)?,
            elapsed_borrowed: bind_one(&self.elapsed_borrowed_summary, pool_name)?,
            elapsed_creation: bind_one(&self.elapsed_creation_summary, pool_name)?,
        })
    }
}
