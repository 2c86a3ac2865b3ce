// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Report the activity of connection pools into a Prometheus registry.
//!
//! Every pool gets its own [`PoolMetricsTracker`] from a shared
//! [`MetricsTrackerFactory`]. All the pools reporting into the same registry
//! share one set of metrics, labeled by pool name, which is registered the
//! first time a pool uses that registry.
//!
//! ```
//! use std::sync::Arc;
//!
//! use poolmetrics::{MetricsTracker, MetricsTrackerFactory};
//! use prometheus::Registry;
//!
//! let factory = MetricsTrackerFactory::default();
//! let registry = Arc::new(Registry::new());
//!
//! let tracker = factory.create("main", &registry)?;
//! tracker.record_connection_acquired_nanos(1_500);
//! tracker.record_connection_timeout();
//! tracker.close();
//! # Ok::<(), poolmetrics::Error>(())
//! ```

#![deny(missing_docs, rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

mod cache;
mod collectors;
mod error;
mod factory;
mod registry;
mod state;
#[cfg(test)]
mod test_utils;
mod tracker;

pub use self::{
    cache::CollectorSetCache,
    collectors::MetricCollectorSet,
    error::Error,
    factory::MetricsTrackerFactory,
    state::{PoolStats, PoolStatsSnapshot},
    tracker::{MetricsTracker, NoopMetricsTracker, PoolMetricsTracker},
};
