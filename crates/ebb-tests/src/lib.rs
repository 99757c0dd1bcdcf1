//! End-to-end and adversarial test suite for the ebb chain state.
//!
//! This crate contains integration tests that drive the chain engine
//! through full block lifecycles, out-of-order and hostile inputs, and
//! differential runs that pin the spend-status cache to the authoritative
//! set. All chain-state invariants are verified from the outside, through
//! the public engine surface only.

pub mod helpers;
