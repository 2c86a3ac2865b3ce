// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod pool_metrics;

pub use self::pool_metrics::{BucketsConfig, PoolMetricsConfig};
use crate::util::ConfigurationSection;

/// Configuration root, as loaded by the process embedding the connection
/// pools
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Configuration related to the metrics reported by connection pools
    #[serde(default, skip_serializing_if = "PoolMetricsConfig::is_default")]
    pub pool_metrics: PoolMetricsConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        self.pool_metrics.validate(figment)?;

        Ok(())
    }
}
