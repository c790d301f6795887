//! Command implementations

pub mod netns;
pub mod network;
