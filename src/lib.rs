pub mod cli;
pub mod commands;
pub mod config;
pub mod orchestrator;
pub mod platform;
pub mod ui;
