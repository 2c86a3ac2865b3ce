// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::Error as _};

use crate::ConfigurationSection;

fn default_namespace() -> String {
    "hikaricp".to_owned()
}

fn default_pool_label() -> String {
    "pool".to_owned()
}

const fn default_true() -> bool {
    true
}

fn default_acquired_nanos_buckets() -> Vec<f64> {
    vec![
        1_000.0,
        10_000.0,
        100_000.0,
        1_000_000.0,
        10_000_000.0,
        100_000_000.0,
        1_000_000_000.0,
        10_000_000_000.0,
    ]
}

fn default_millis_buckets() -> Vec<f64> {
    vec![
        1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
        30_000.0,
    ]
}

fn is_default_true(value: &bool) -> bool {
    *value
}

/// Histogram bucket boundaries used for the connection timing metrics
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BucketsConfig {
    /// Upper bounds of the buckets for the time spent acquiring a connection,
    /// in nanoseconds
    #[serde(default = "default_acquired_nanos_buckets")]
    pub acquired_nanos: Vec<f64>,

    /// Upper bounds of the buckets for the time a connection was borrowed from
    /// the pool, in milliseconds
    #[serde(default = "default_millis_buckets")]
    pub usage_millis: Vec<f64>,

    /// Upper bounds of the buckets for the time it took to create a new
    /// connection, in milliseconds
    #[serde(default = "default_millis_buckets")]
    pub creation_millis: Vec<f64>,
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            acquired_nanos: default_acquired_nanos_buckets(),
            usage_millis: default_millis_buckets(),
            creation_millis: default_millis_buckets(),
        }
    }
}

impl BucketsConfig {
    fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// Configuration related to the metrics reported by connection pools
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PoolMetricsConfig {
    /// Prefix of every metric name.
    ///
    /// Defaults to `hikaricp`.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the label carrying the name of the pool.
    ///
    /// Defaults to `pool`.
    #[serde(default = "default_pool_label")]
    pub pool_label: String,

    /// Whether pools which expose their state should also report gauges of
    /// their active, idle and pending connections.
    ///
    /// Defaults to `true`.
    #[serde(default = "default_true", skip_serializing_if = "is_default_true")]
    pub pool_state: bool,

    /// Histogram bucket boundaries
    #[serde(default, skip_serializing_if = "BucketsConfig::is_default")]
    pub buckets: BucketsConfig,
}

impl Default for PoolMetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            pool_label: default_pool_label(),
            pool_state: true,
            buckets: BucketsConfig::default(),
        }
    }
}

impl PoolMetricsConfig {
    /// Returns true if all fields are at their default values
    pub(crate) fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

/// Check that a string is usable as a Prometheus metric or label name.
///
/// The first character must be an ASCII letter or an underscore, the following
/// ones ASCII alphanumerics or underscores.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_buckets(buckets: &[f64]) -> Result<(), &'static str> {
    if buckets.is_empty() {
        return Err("bucket list must not be empty");
    }

    if buckets.iter().any(|b| !b.is_finite()) {
        return Err("bucket boundaries must be finite numbers");
    }

    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err("bucket boundaries must be strictly increasing");
    }

    Ok(())
}

impl ConfigurationSection for PoolMetricsConfig {
    const PATH: Option<&'static str> = Some("pool_metrics");

    fn validate(
        &self,
        _figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if !is_valid_name(&self.namespace) {
            return Err(figment::error::Error::custom(
                "Namespace must be a valid Prometheus metric name prefix",
            )
            .with_path("namespace")
            .into());
        }

        // Labels starting with `__` are reserved for internal use
        if !is_valid_name(&self.pool_label) || self.pool_label.starts_with("__") {
            return Err(figment::error::Error::custom(
                "Pool label must be a valid Prometheus label name",
            )
            .with_path("pool_label")
            .into());
        }

        for (field, buckets) in [
            ("acquired_nanos", &self.buckets.acquired_nanos),
            ("usage_millis", &self.buckets.usage_millis),
            ("creation_millis", &self.buckets.creation_millis),
        ] {
            if let Err(message) = validate_buckets(buckets) {
                return Err(figment::error::Error::custom(message)
                    .with_path(&format!("buckets.{field}"))
                    .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Format, Yaml},
    };

    use super::*;
    use crate::ConfigurationSectionExt;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    pool_metrics:
                      namespace: myapp_db
                      pool_state: false
                      buckets:
                        usage_millis: [1.0, 10.0, 100.0]
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = PoolMetricsConfig::extract(&figment).map_err(|e| e.to_string())?;

            assert_eq!(config.namespace, "myapp_db");
            assert_eq!(config.pool_label, "pool");
            assert!(!config.pool_state);
            assert_eq!(config.buckets.usage_millis, vec![1.0, 10.0, 100.0]);
            assert_eq!(config.buckets.creation_millis, default_millis_buckets());
            assert_eq!(
                config.buckets.acquired_nanos,
                default_acquired_nanos_buckets()
            );

            Ok(())
        });
    }

    #[test]
    fn missing_section_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "other: {}")?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config =
                PoolMetricsConfig::extract_or_default(&figment).map_err(|e| e.to_string())?;

            assert_eq!(config, PoolMetricsConfig::default());
            assert!(config.is_default());

            Ok(())
        });
    }

    #[test]
    fn reject_invalid_namespace() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    pool_metrics:
                      namespace: 1-invalid
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = PoolMetricsConfig::extract(&figment).unwrap_err();
            assert!(error.to_string().contains("Namespace"));

            Ok(())
        });
    }

    #[test]
    fn reject_reserved_label() {
        let config = PoolMetricsConfig {
            pool_label: "__pool".to_owned(),
            ..PoolMetricsConfig::default()
        };

        assert!(config.validate(&Figment::new()).is_err());
    }

    #[test]
    fn reject_unordered_buckets() {
        let mut config = PoolMetricsConfig::default();
        config.buckets.creation_millis = vec![10.0, 5.0];
        let error = config.validate(&Figment::new()).unwrap_err();
        assert!(error.to_string().contains("strictly increasing"));

        config.buckets.creation_millis = vec![];
        let error = config.validate(&Figment::new()).unwrap_err();
        assert!(error.to_string().contains("must not be empty"));

        config.buckets.creation_millis = vec![1.0, f64::INFINITY];
        let error = config.validate(&Figment::new()).unwrap_err();
        assert!(error.to_string().contains("finite"));
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("hikaricp"));
        assert!(is_valid_name("_private"));
        assert!(is_valid_name("db_pool2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("2pools"));
        assert!(!is_valid_name("pool-name"));
        assert!(!is_valid_name("pool:name"));
    }
}
