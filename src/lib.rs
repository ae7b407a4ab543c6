pub mod addr;
pub mod clock;
pub mod config;
pub mod error;
pub mod v4;
pub mod v6;

pub use config::{Config, DhcpV4Config, DhcpV6Config};
pub use v4::server::{get_leases as get_leases_v4, init_v4, process_v4, sweep as sweep_v4, State4};
pub use v6::server::{get_leases as get_leases_v6, init_v6, process_v6, sweep as sweep_v6, State6};
