pub mod constants;
pub mod config;
pub mod error;
pub mod logging;
pub mod time_utils;
pub mod types;

// Collaborator contracts and their implementations
pub mod app;
pub mod infra;

pub mod pipeline;
