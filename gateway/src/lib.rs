pub mod config;
pub mod error;
pub mod proxy;
pub mod router;
pub mod server;
