//! Domain models for UCAM.
//!
//! These are the core types shared across all crates.

pub mod access_rule;
pub mod audit;
pub mod catalog;
pub mod principal;
pub mod statement;
