pub mod agent;
pub mod batch;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod review;
pub mod telemetry;
pub mod triage;
pub mod util;
pub mod workflow;
pub mod workspace;

#[cfg(test)]
mod fakes;
