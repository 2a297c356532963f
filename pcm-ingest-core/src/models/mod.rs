pub mod config;
pub mod container;
pub mod error;
pub mod format;
pub mod recording_result;
pub mod state;
