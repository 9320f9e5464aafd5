// ABOUTME: Library root for harbormaster - resumable server and deployment orchestration.
// ABOUTME: Remote services are traits; the orchestrator module sequences calls to them.

pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod runner;
pub mod ssh;
pub mod store;
pub mod telemetry;
pub mod types;
