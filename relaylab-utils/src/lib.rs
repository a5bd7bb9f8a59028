//! Utility library for the RelayLab testbed tooling

pub mod files;
pub mod other;
pub mod serde;
