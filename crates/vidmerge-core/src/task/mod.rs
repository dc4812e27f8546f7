pub mod orchestrator;
pub mod store;
