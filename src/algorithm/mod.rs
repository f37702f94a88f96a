//! Analysis algorithms
//!
//! This module contains the statistical core of the workflow: propensity
//! score estimation, matched-pair construction with balance checking,
//! and outcome comparison on the matched cohort.

pub mod matching;
pub mod outcome;
pub mod propensity;
