// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use figment::Figment;
use serde::de::DeserializeOwned;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A part of the configuration which can be loaded on its own from a
/// [`Figment`].
pub trait ConfigurationSection: Sized + DeserializeOwned {
    /// Where this section lives relative to the root of the configuration, or
    /// [`None`] if it is the root itself.
    const PATH: Option<&'static str> = None;

    /// Check the values of the section after they were deserialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    fn validate(&self, _figment: &Figment) -> Result<(), BoxError> {
        Ok(())
    }

    /// Deserialize and validate the section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section is missing, could not be deserialized
    /// or is invalid
    fn extract(figment: &Figment) -> Result<Self, BoxError> {
        let this: Self = match Self::PATH {
            Some(path) => figment.extract_inner(path)?,
            None => figment.extract()?,
        };

        this.validate(figment)?;
        Ok(this)
    }
}

/// Extension of [`ConfigurationSection`] for sections which have a sensible
/// default when they are absent from the configuration.
pub trait ConfigurationSectionExt: ConfigurationSection + Default {
    /// Deserialize and validate the section, falling back to
    /// [`Default::default`] if it is not present at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the section is present but invalid
    fn extract_or_default(figment: &Figment) -> Result<Self, BoxError> {
        if let Some(path) = Self::PATH
            && !figment.contains(path)
        {
            return Ok(Self::default());
        }

        Self::extract(figment)
    }
}

impl<T: ConfigurationSection + Default> ConfigurationSectionExt for T {}
