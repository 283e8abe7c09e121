pub mod base;
pub mod cli;
pub mod config;
pub mod messages;
pub mod receiver;
pub mod runtime;
pub mod watchdog;
