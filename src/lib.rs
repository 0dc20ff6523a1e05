// Library for the binary and integration tests

pub mod aggregator;
pub mod config;
pub mod error;
pub mod models;
pub mod process;
pub mod rate;
pub mod registry;
pub mod sampler;
pub mod source;
pub mod version;
