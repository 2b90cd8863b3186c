pub mod error;
pub mod exp_table;
pub mod logger;
pub mod orchestrator;
pub mod pause;
pub mod platform;
pub mod registry;
pub mod settings;
pub mod signal;
pub mod sleep;
pub mod types;
pub mod vision;
pub mod workflow;
