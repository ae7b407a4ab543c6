//! DHCPv6 option codec: raw TLV framing plus a typed semantic layer for
//! the recursive option types.
//!
//! Parsing terminates purely on `data.is_empty()`; there is no sentinel
//! byte sequence involved, unlike some v6 option parsers that match a
//! literal string as their recursion base case and never terminate on
//! true end-of-input.
//!
//! IA_NA/IAADDR sub-options are represented as a recursive option tree,
//! not as an opaque byte slice.

use std::net::Ipv6Addr;

use crate::error::WireError;

pub const OPT_CLIENTID: u16 = 1;
pub const OPT_SERVERID: u16 = 2;
pub const OPT_IA_NA: u16 = 3;
pub const OPT_IAADDR: u16 = 5;
pub const OPT_ORO: u16 = 6;
pub const OPT_ELAPSED_TIME: u16 = 8;
pub const OPT_STATUS_CODE: u16 = 13;
pub const OPT_RAPID_COMMIT: u16 = 14;
pub const OPT_DNS_SERVERS: u16 = 23;

pub const STATUS_SUCCESS: u16 = 0;
pub const STATUS_NO_ADDRS_AVAIL: u16 = 2;
pub const STATUS_NO_BINDING: u16 = 3;
pub const STATUS_NOT_ON_LINK: u16 = 4;

/// A raw `(code, data)` option as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl RawOption {
    pub fn new(code: u16, data: Vec<u8>) -> Self {
        Self { code, data }
    }
}

/// Parse a `(code:u16, length:u16, data[length])*` stream. No framing
/// markers exist in v6; parsing stops when the buffer is exhausted.
pub fn parse_options(data: &[u8]) -> Result<Vec<RawOption>, WireError> {
    let mut options = Vec::new();
    let mut i = 0;

    while i < data.len() {
        if i + 4 > data.len() {
            return Err(WireError::TruncatedOption);
        }
        let code = u16::from_be_bytes([data[i], data[i + 1]]);
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        i += 4;
        if i + len > data.len() {
            return Err(WireError::TruncatedOption);
        }
        options.push(RawOption::new(code, data[i..i + len].to_vec()));
        i += len;
    }

    Ok(options)
}

pub fn encode_options(options: &[RawOption]) -> Vec<u8> {
    let mut buf = Vec::new();
    for opt in options {
        buf.extend_from_slice(&opt.code.to_be_bytes());
        buf.extend_from_slice(&(opt.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&opt.data);
    }
    buf
}

pub fn find<'a>(options: &'a [RawOption], code: u16) -> Option<&'a RawOption> {
    options.iter().find(|o| o.code == code)
}

pub fn find_all<'a>(options: &'a [RawOption], code: u16) -> impl Iterator<Item = &'a RawOption> {
    options.iter().filter(move |o| o.code == code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IaNa {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub options: Vec<RawOption>,
}

impl IaNa {
    pub fn addresses(&self) -> Vec<IaAddr> {
        find_all(&self.options, OPT_IAADDR)
            .filter_map(|o| decode_iaaddr(&o.data).ok())
            .collect()
    }

    pub fn status(&self) -> Option<(u16, String)> {
        find(&self.options, OPT_STATUS_CODE).and_then(|o| decode_status_code(&o.data).ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IaAddr {
    pub address: Ipv6Addr,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub options: Vec<RawOption>,
}

pub fn decode_ia_na(data: &[u8]) -> Result<IaNa, WireError> {
    if data.len() < 12 {
        return Err(WireError::MalformedOption(OPT_IA_NA));
    }
    let iaid = u32::from_be_bytes(data[0..4].try_into().unwrap());
    let t1 = u32::from_be_bytes(data[4..8].try_into().unwrap());
    let t2 = u32::from_be_bytes(data[8..12].try_into().unwrap());
    let options = parse_options(&data[12..])?;
    Ok(IaNa { iaid, t1, t2, options })
}

pub fn encode_ia_na(ia: &IaNa) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + 16);
    buf.extend_from_slice(&ia.iaid.to_be_bytes());
    buf.extend_from_slice(&ia.t1.to_be_bytes());
    buf.extend_from_slice(&ia.t2.to_be_bytes());
    buf.extend_from_slice(&encode_options(&ia.options));
    buf
}

pub fn decode_iaaddr(data: &[u8]) -> Result<IaAddr, WireError> {
    if data.len() < 24 {
        return Err(WireError::MalformedOption(OPT_IAADDR));
    }
    let address = Ipv6Addr::from(<[u8; 16]>::try_from(&data[0..16]).unwrap());
    let preferred_lifetime = u32::from_be_bytes(data[16..20].try_into().unwrap());
    let valid_lifetime = u32::from_be_bytes(data[20..24].try_into().unwrap());
    let options = parse_options(&data[24..])?;
    Ok(IaAddr { address, preferred_lifetime, valid_lifetime, options })
}

pub fn encode_iaaddr(addr: &IaAddr) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&addr.address.octets());
    buf.extend_from_slice(&addr.preferred_lifetime.to_be_bytes());
    buf.extend_from_slice(&addr.valid_lifetime.to_be_bytes());
    buf.extend_from_slice(&encode_options(&addr.options));
    buf
}

pub fn decode_status_code(data: &[u8]) -> Result<(u16, String), WireError> {
    if data.len() < 2 {
        return Err(WireError::MalformedOption(OPT_STATUS_CODE));
    }
    let code = u16::from_be_bytes([data[0], data[1]]);
    let msg = String::from_utf8(data[2..].to_vec()).map_err(|_| WireError::MalformedOption(OPT_STATUS_CODE))?;
    Ok((code, msg))
}

pub fn encode_status_code(code: u16, msg: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + msg.len());
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(msg.as_bytes());
    buf
}

pub fn status_code_option(code: u16, msg: &str) -> RawOption {
    RawOption::new(OPT_STATUS_CODE, encode_status_code(code, msg))
}

pub fn decode_oro(data: &[u8]) -> Result<Vec<u16>, WireError> {
    if data.len() % 2 != 0 {
        return Err(WireError::MalformedOption(OPT_ORO));
    }
    Ok(data.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

pub fn decode_dns_servers(data: &[u8]) -> Result<Vec<Ipv6Addr>, WireError> {
    if data.len() % 16 != 0 {
        return Err(WireError::MalformedOption(OPT_DNS_SERVERS));
    }
    Ok(data
        .chunks_exact(16)
        .map(|c| Ipv6Addr::from(<[u8; 16]>::try_from(c).unwrap()))
        .collect())
}

pub fn encode_dns_servers(servers: &[Ipv6Addr]) -> Vec<u8> {
    servers.iter().flat_map(|a| a.octets()).collect()
}

pub fn elapsed_time_option(hundredths: u16) -> RawOption {
    RawOption::new(OPT_ELAPSED_TIME, hundredths.to_be_bytes().to_vec())
}

pub fn duid_option(code: u16, duid: &[u8]) -> RawOption {
    RawOption::new(code, duid.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_flat_options() {
        let opts = vec![
            RawOption::new(OPT_CLIENTID, b"test-client-duid".to_vec()),
            RawOption::new(OPT_ELAPSED_TIME, vec![0, 5]),
        ];
        let bytes = encode_options(&opts);
        assert_eq!(parse_options(&bytes).unwrap(), opts);
    }

    #[test]
    fn empty_buffer_terminates_without_sentinel() {
        assert_eq!(parse_options(&[]).unwrap(), vec![]);
    }

    #[test]
    fn truncated_v6_option_is_an_error() {
        // code + length header present, but value bytes missing
        let bytes = vec![0, 1, 0, 10];
        assert_eq!(parse_options(&bytes), Err(WireError::TruncatedOption));
    }

    #[test]
    fn ia_na_with_nested_iaaddr_roundtrips() {
        let iaaddr = IaAddr {
            address: "2001:db8::1000".parse().unwrap(),
            preferred_lifetime: 1800,
            valid_lifetime: 3600,
            options: vec![],
        };
        let ia = IaNa {
            iaid: 12345,
            t1: 900,
            t2: 1440,
            options: vec![RawOption::new(OPT_IAADDR, encode_iaaddr(&iaaddr))],
        };
        let bytes = encode_ia_na(&ia);
        let decoded = decode_ia_na(&bytes).unwrap();
        assert_eq!(decoded.iaid, 12345);
        let addrs = decoded.addresses();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0], iaaddr);
    }

    #[test]
    fn status_code_roundtrips() {
        let opt = status_code_option(STATUS_NO_ADDRS_AVAIL, "no addresses available");
        let (code, msg) = decode_status_code(&opt.data).unwrap();
        assert_eq!(code, STATUS_NO_ADDRS_AVAIL);
        assert_eq!(msg, "no addresses available");
    }
}
