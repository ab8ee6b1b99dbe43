//! # arden-tests
//!
//! Integration tests for the Arden node view synchronizer.
//!
//! This crate provides:
//! - A harness that drives a synchronizer directly, playing the roles of the
//!   network controller and the view holder
//! - Deterministic data generators for peers, transactions and block chains
//! - End-to-end sync scenarios and property-based invariant tests

pub mod generators;
pub mod harness;


#[cfg(test)]
mod sync_tests;
