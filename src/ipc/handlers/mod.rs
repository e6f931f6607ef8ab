pub mod catalog;
pub mod core;
pub mod metrics;
pub mod plan;
pub mod quiz;
pub mod setup;
