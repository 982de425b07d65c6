pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod repository;
pub mod router;
pub mod server;
pub mod service;

#[cfg(test)]
pub mod test_utils;
