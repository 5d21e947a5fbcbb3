//! # stm_testkit
//!
//! Test utilities for `stm_core`.
//!
//! This crate provides:
//! - Randomized property-test generators over region/transaction
//!   operations
//! - Concurrent stress harnesses that exercise the batcher under load

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod generators;
pub mod stress;

pub use stress::{run_concurrent_writers, StressConfig, StressTestResult};
