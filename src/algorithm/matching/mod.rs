//! Propensity score matching for the claim comparison workflow
//!
//! This module pairs treated members with controls on their estimated
//! propensity scores. It includes:
//!
//! 1. Match settings (caliper width and scale, processing order)
//! 2. The greedy nearest-neighbour matcher, 1:1 and without replacement
//! 3. Covariate balance assessment before and after matching
//!
//! Matching is deterministic for every configuration: processing order is
//! explicit and distance ties resolve to the lower row index.

pub mod balance;
pub mod criteria;
pub mod matcher;

// Re-export key types
pub use balance::{BalanceChecker, BalanceMetric, BalanceReport, BalanceSummary};
pub use criteria::{CaliperScale, MatchOrder, MatchSettings, MatchSettingsBuilder};
pub use matcher::{MatchOutcome, MatchedPair, Matcher};
