pub mod lease;
pub mod message;
pub mod options;
pub mod server;
pub mod transport;
