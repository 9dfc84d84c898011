pub mod cli;
pub mod config;
pub mod constants;
pub mod database;
pub mod engine;
pub mod kv;
pub mod register;
pub mod secrets;
pub mod service;
pub mod systemd;
pub mod template;

pub use anyhow::Result;
