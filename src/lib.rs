pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod provision;
pub mod ui;
pub mod update;
