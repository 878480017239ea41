// Public API - the runner drives a whole restore, the rest is the engine
pub mod runner;

pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod load;
pub mod value;

// Internal modules
mod telemetry;
