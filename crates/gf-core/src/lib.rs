pub mod action;
pub mod config;
pub mod file_ops;
pub mod phase_map;
pub mod reducer;
pub mod registry;
pub mod settings;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod timestamp;
pub mod types;
