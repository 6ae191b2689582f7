pub mod cli_client;
pub mod config;
pub mod models;
pub mod services;
pub mod surface;
