//! Matching settings for propensity score matching
//!
//! This module defines the parameters that control how treated members are
//! paired with controls: the caliper width, the scale the caliper is
//! measured on, and the order treated members are processed in.

use serde::Deserialize;

use crate::error::{CohortError, Result};

/// Scale on which the caliper distance is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaliperScale {
    /// Absolute difference of the propensity probabilities
    Probability,
    /// Absolute difference of the propensity log-odds
    Logit,
}

impl Default for CaliperScale {
    fn default() -> Self {
        Self::Probability
    }
}

/// Order in which treated members are processed by the greedy matcher.
///
/// Every order is deterministic; score ties fall back to dataset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrder {
    /// Input row order
    DataOrder,
    /// Lowest propensity score first
    AscendingScore,
    /// Highest propensity score first
    DescendingScore,
}

impl Default for MatchOrder {
    fn default() -> Self {
        Self::DataOrder
    }
}

/// Settings for the greedy nearest-neighbour matcher.
///
/// Matching is always 1:1 and without replacement; these settings control
/// the caliper and the deterministic processing order.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Maximum allowed score distance for an accepted pair. A caliper of
    /// zero accepts only exact score equality.
    pub caliper: f64,

    /// Scale the caliper is measured on
    pub scale: CaliperScale,

    /// Processing order for treated members
    pub order: MatchOrder,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            caliper: 0.05,
            scale: CaliperScale::Probability,
            order: MatchOrder::DataOrder,
        }
    }
}

impl MatchSettings {
    /// Create settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder for constructing match settings.
    #[must_use]
    pub fn builder() -> MatchSettingsBuilder {
        MatchSettingsBuilder::new()
    }

    /// Check that the caliper is usable.
    ///
    /// # Errors
    /// Returns `CohortError::Config` for a negative or non-finite caliper.
    pub fn validate(&self) -> Result<()> {
        if !self.caliper.is_finite() || self.caliper < 0.0 {
            return Err(CohortError::Config(format!(
                "caliper must be a non-negative finite number, got {}",
                self.caliper
            )));
        }
        Ok(())
    }

    /// Convert to a human-readable string representation.
    #[must_use]
    pub fn to_string_representation(&self) -> String {
        format!(
            "Match settings:\n\
             - Caliper: {} ({})\n\
             - Processing order: {}",
            self.caliper,
            match self.scale {
                CaliperScale::Probability => "probability scale",
                CaliperScale::Logit => "logit scale",
            },
            match self.order {
                MatchOrder::DataOrder => "dataset order",
                MatchOrder::AscendingScore => "ascending score",
                MatchOrder::DescendingScore => "descending score",
            }
        )
    }
}

/// Builder for constructing match settings
#[derive(Debug, Clone)]
pub struct MatchSettingsBuilder {
    settings: MatchSettings,
}

impl Default for MatchSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchSettingsBuilder {
    /// Create a new builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: MatchSettings::default(),
        }
    }

    /// Set the caliper width
    #[must_use]
    pub const fn caliper(mut self, caliper: f64) -> Self {
        self.settings.caliper = caliper;
        self
    }

    /// Set the caliper scale
    #[must_use]
    pub const fn scale(mut self, scale: CaliperScale) -> Self {
        self.settings.scale = scale;
        self
    }

    /// Set the processing order
    #[must_use]
    pub const fn order(mut self, order: MatchOrder) -> Self {
        self.settings.order = order;
        self
    }

    /// Build the match settings
    #[must_use]
    pub const fn build(self) -> MatchSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let settings = MatchSettings::builder()
            .caliper(0.2)
            .scale(CaliperScale::Logit)
            .order(MatchOrder::DescendingScore)
            .build();

        assert!((settings.caliper - 0.2).abs() < 1e-12);
        assert_eq!(settings.scale, CaliperScale::Logit);
        assert_eq!(settings.order, MatchOrder::DescendingScore);
        settings.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_calipers() {
        assert!(MatchSettings::builder().caliper(-0.1).build().validate().is_err());
        assert!(
            MatchSettings::builder()
                .caliper(f64::NAN)
                .build()
                .validate()
                .is_err()
        );
        // Zero is a legal caliper: exact-equality matching
        assert!(MatchSettings::builder().caliper(0.0).build().validate().is_ok());
    }

    #[test]
    fn test_deserializes_from_snake_case() {
        let settings: MatchSettings =
            serde_json::from_str(r#"{ "caliper": 0.1, "scale": "logit", "order": "data_order" }"#)
                .unwrap();
        assert_eq!(settings.scale, CaliperScale::Logit);
        assert_eq!(settings.order, MatchOrder::DataOrder);
    }
}
