//! Utility module for serde of types.

pub mod sorted_map;

pub use sorted_map::SortedMap;
