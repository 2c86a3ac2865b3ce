// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use thiserror::Error;

/// All possible errors when creating a tracker for a pool.
///
/// Recording and closing never fail, so this only surfaces from
/// [`MetricsTrackerFactory::create`](crate::MetricsTrackerFactory::create) and
/// its variants.
#[derive(Debug, Error)]
pub enum Error {
    /// The pool name was empty.
    #[error("Pool name must not be empty")]
    EmptyPoolName,

    /// A metric with the same name was already registered on the registry, by
    /// something else than this factory.
    ///
    /// This covers both an identical metric and one with the same name but a
    /// different help string or label names. The registry remembers the shape
    /// of a name even after its metric is unregistered, so the latter keeps
    /// failing until the registry is replaced.
    #[error("Metric {name:?} is already registered on this registry")]
    DuplicateRegistration {
        /// Name of the metric which could not be registered
        name: String,
    },

    /// The registry refused a metric for another reason.
    #[error("Failed to register metric {name:?}")]
    Registration {
        /// Name of the metric which could not be registered
        name: String,

        /// The underlying error
        #[source]
        source: prometheus::Error,
    },

    /// The histogram buckets of a metric were rejected.
    #[error("Invalid buckets for metric {name:?}")]
    InvalidBuckets {
        /// Name of the metric
        name: String,

        /// The underlying error
        #[source]
        source: prometheus::Error,
    },

    /// The metric could not be bound to the pool label.
    #[error("Failed to bind metric {name:?} to pool {pool:?}")]
    LabelBinding {
        /// Name of the metric
        name: String,

        /// Name of the pool
        pool: String,

        /// The underlying error
        #[source]
        source: prometheus::Error,
    },
}

/// What the registry says when a name is taken by a metric of another shape
const NAME_CLASH: &str = "same fully-qualified name";

impl Error {
    pub(crate) fn registration(name: impl Into<String>, source: prometheus::Error) -> Self {
        let name = name.into();
        match source {
            prometheus::Error::AlreadyReg => Self::DuplicateRegistration { name },
            prometheus::Error::Msg(msg) if msg.contains(NAME_CLASH) => {
                Self::DuplicateRegistration { name }
            }
            source => Self::Registration { name, source },
        }
    }
}
