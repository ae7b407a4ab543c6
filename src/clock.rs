//! Injectable wall clock, seconds since the Unix epoch.
//!
//! The server cores never read `SystemTime::now()` directly (the source
//! material does, via `hr-ipv6/dhcpv6.rs`'s `Dhcpv6LeaseStore::allocate`) so
//! that tests can drive expiry and renewal deterministically with a fake.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Reads the real wall clock. Used by the transport adapters and `main.rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
