//! Cadenza core: real-time effect chains, mastering and the vocal FX suite

pub mod domain;

pub use domain::*;
