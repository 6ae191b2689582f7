pub mod poller;
pub mod transport;
