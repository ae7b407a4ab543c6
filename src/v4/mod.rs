pub mod lease;
pub mod options;
pub mod packet;
pub mod server;
pub mod transport;
