//! Cross-crate integration tests for the cadenza pipeline
//!
//! Run with `cargo test -p cadenza-tests`.

#![cfg(test)]

mod pipeline_integration;
mod persistence_integration;
mod properties;
mod signals;
