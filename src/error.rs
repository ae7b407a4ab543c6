//! Error taxonomy.
//!
//! `WireError` and `ConfigError` are `thiserror` leaf types returned by
//! value, the way `hr-dhcp::packet::DhcpParseError` is. `CoreError` covers
//! the handful of outcomes a server core can reach that either get encoded
//! into a protocol response (`NoAddressesAvailable`, `WrongServer`,
//! `NoBinding`, `NotOnLink`) or indicate a programmer error (`Internal`)
//! that should never be reachable from valid input.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("bad magic cookie")]
    BadMagicCookie,
    #[error("option would read past the end of the buffer")]
    TruncatedOption,
    #[error("malformed classless static route option")]
    MalformedClasslessRoute,
    #[error("malformed option data for code {0}")]
    MalformedOption(u16),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid address {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("range_start must be <= range_end")]
    RangeOrder,
    #[error("range_start/range_end must lie within the configured subnet")]
    RangeOutsideSubnet,
    #[error("lease_time must be >= {min} seconds")]
    LeaseTimeTooShort { min: u32 },
    #[error("prefix_length must be in 0..=128, got {0}")]
    InvalidPrefixLength(u8),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("no addresses available in the pool")]
    NoAddressesAvailable,
    #[error("client addressed a different server")]
    WrongServer,
    #[error("no binding found for this client")]
    NoBinding,
    #[error("address is not on link")]
    NotOnLink,
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}
