pub mod config;
pub mod errors;
pub mod issues;
pub mod telemetry;
