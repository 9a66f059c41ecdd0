// src/lib.rs
pub mod config;
pub mod metrics;
pub mod router;
pub mod server;

pub use config::AppConfig;
pub use router::Router;
pub use server::{create_application, resolve_address, ListenTarget, Listener};
