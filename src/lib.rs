#[cfg(feature = "admin")]
pub mod admin;
#[cfg(feature = "client")]
pub mod client;
pub mod common;
pub mod utils;
