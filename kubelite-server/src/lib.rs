//! Kubelite control surface and process wiring.

pub mod config;
pub mod server;

pub use config::Config;
pub use server::{ServerState, router, run_server, serve};
