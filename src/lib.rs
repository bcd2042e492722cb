pub mod cli;
pub mod config;
pub mod errors;
pub mod index;
pub mod manifest;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod sandbox;
pub mod scheduler;
pub mod utils;
