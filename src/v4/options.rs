//! DHCPv4 option codec: raw TLV framing plus a typed semantic layer.
//!
//! The raw layer (`DhcpOption`, `parse_options`/`encode_options`) mirrors
//! `hr-dhcp::options`. The typed layer is new: rather than untyped
//! `(code, bytes)` pairs with ad hoc per-call accessors (`as_ipv4`,
//! `as_u32`, ...), `OptionValue` is a tagged sum with one variant per
//! option kind.

use std::net::Ipv4Addr;

use crate::error::WireError;

pub const OPT_PAD: u8 = 0;
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_TIME_OFFSET: u8 = 2;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS_SERVER: u8 = 6;
pub const OPT_HOSTNAME: u8 = 12;
pub const OPT_DOMAIN_NAME: u8 = 15;
pub const OPT_BROADCAST_ADDR: u8 = 28;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_OVERLOAD: u8 = 52;
pub const OPT_MSG_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_PARAM_REQUEST: u8 = 55;
pub const OPT_MESSAGE: u8 = 56;
pub const OPT_MAX_MSG_SIZE: u8 = 57;
pub const OPT_RENEWAL_TIME: u8 = 58;
pub const OPT_REBINDING_TIME: u8 = 59;
pub const OPT_CLIENT_ID: u8 = 61;
pub const OPT_CLASSLESS_STATIC_ROUTE: u8 = 121;
pub const OPT_END: u8 = 255;

pub const DHCPDISCOVER: u8 = 1;
pub const DHCPOFFER: u8 = 2;
pub const DHCPREQUEST: u8 = 3;
pub const DHCPDECLINE: u8 = 4;
pub const DHCPACK: u8 = 5;
pub const DHCPNAK: u8 = 6;
pub const DHCPRELEASE: u8 = 7;
pub const DHCPINFORM: u8 = 8;

/// A raw `(code, data)` option as it appears on the wire. `length` is
/// implicit in `data.len()` (0..=255, enforced at parse/encode time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u8,
    pub data: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u8, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    pub fn msg_type(t: u8) -> Self {
        Self::new(OPT_MSG_TYPE, vec![t])
    }

    pub fn server_id(ip: Ipv4Addr) -> Self {
        Self::new(OPT_SERVER_ID, ip.octets().to_vec())
    }

    pub fn lease_time(secs: u32) -> Self {
        Self::new(OPT_LEASE_TIME, secs.to_be_bytes().to_vec())
    }

    pub fn renewal_time(secs: u32) -> Self {
        Self::new(OPT_RENEWAL_TIME, secs.to_be_bytes().to_vec())
    }

    pub fn rebinding_time(secs: u32) -> Self {
        Self::new(OPT_REBINDING_TIME, secs.to_be_bytes().to_vec())
    }

    pub fn subnet_mask(mask: Ipv4Addr) -> Self {
        Self::new(OPT_SUBNET_MASK, mask.octets().to_vec())
    }

    pub fn router(ip: Ipv4Addr) -> Self {
        Self::new(OPT_ROUTER, ip.octets().to_vec())
    }

    pub fn dns_servers(ips: &[Ipv4Addr]) -> Self {
        let mut data = Vec::with_capacity(ips.len() * 4);
        for ip in ips {
            data.extend_from_slice(&ip.octets());
        }
        Self::new(OPT_DNS_SERVER, data)
    }

    pub fn domain_name(name: &str) -> Self {
        Self::new(OPT_DOMAIN_NAME, name.as_bytes().to_vec())
    }

    pub fn hostname(name: &str) -> Self {
        Self::new(OPT_HOSTNAME, name.as_bytes().to_vec())
    }

    pub fn broadcast(ip: Ipv4Addr) -> Self {
        Self::new(OPT_BROADCAST_ADDR, ip.octets().to_vec())
    }

    pub fn message(text: &str) -> Self {
        Self::new(OPT_MESSAGE, text.as_bytes().to_vec())
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        if self.data.len() == 4 {
            Some(Ipv4Addr::new(self.data[0], self.data[1], self.data[2], self.data[3]))
        } else {
            None
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        if self.data.len() == 4 {
            Some(u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<String> {
        String::from_utf8(self.data.clone()).ok()
    }
}

/// Parse a TLV option stream until `OPT_END` or the buffer runs out.
/// `OPT_PAD` bytes are skipped. A length that would read past the buffer
/// is a hard parse error (`TruncatedOption`).
pub fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>, WireError> {
    let mut options = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let code = data[i];
        if code == OPT_END {
            break;
        }
        if code == OPT_PAD {
            i += 1;
            continue;
        }
        i += 1;
        if i >= data.len() {
            return Err(WireError::TruncatedOption);
        }
        let len = data[i] as usize;
        i += 1;
        if i + len > data.len() {
            return Err(WireError::TruncatedOption);
        }
        options.push(DhcpOption::new(code, data[i..i + len].to_vec()));
        i += len;
    }

    Ok(options)
}

pub fn encode_options(options: &[DhcpOption]) -> Vec<u8> {
    let mut buf = Vec::new();
    for opt in options {
        buf.push(opt.code);
        buf.push(opt.data.len() as u8);
        buf.extend_from_slice(&opt.data);
    }
    buf.push(OPT_END);
    buf
}

/// Typed decode of the known option codes. Anything not recognized decodes
/// as `Unknown`, carrying the raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Ipv4(Ipv4Addr),
    Ipv4List(Vec<Ipv4Addr>),
    I32(i32),
    U32(u32),
    U16(u16),
    U16List(Vec<u16>),
    U8(u8),
    U8List(Vec<u8>),
    Bool(bool),
    Text(String),
    IpMaskPairs(Vec<(Ipv4Addr, Ipv4Addr)>),
    MessageType(u8),
    ClientIdentifier { htype: u8, id: Vec<u8> },
    ClasslessStaticRoutes(Vec<ClasslessRoute>),
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasslessRoute {
    pub prefix_len: u8,
    /// Network address, host bits beyond `prefix_len` masked to zero.
    pub destination: Ipv4Addr,
    pub router: Ipv4Addr,
}

fn is_ipv4_list_code(code: u8) -> bool {
    matches!(
        code,
        3..=11 | 41 | 42 | 44 | 45 | 48 | 49 | 65 | 68..=76
    )
}

fn is_text_code(code: u8) -> bool {
    matches!(code, 12 | 14 | 15 | 17 | 18 | 40 | 43 | 47 | 56 | 62..=64 | 100 | 101)
}

fn is_u16_code(code: u8) -> bool {
    matches!(code, 13 | 22 | 26 | 57)
}

fn is_bool_code(code: u8) -> bool {
    matches!(code, 19 | 20 | 27 | 29 | 30 | 31 | 34 | 36 | 39)
}

fn is_ip_mask_pair_code(code: u8) -> bool {
    matches!(code, 21 | 33)
}

fn is_u8_code(code: u8) -> bool {
    matches!(code, 23 | 37 | 46 | 52)
}

fn is_u32_code(code: u8) -> bool {
    matches!(code, 24 | 35 | 38 | 51 | 58 | 59)
}

/// Decode `(code, raw_value)` into its typed form, one variant per option kind.
pub fn decode_option(code: u8, value: &[u8]) -> Result<OptionValue, WireError> {
    Ok(match code {
        OPT_SUBNET_MASK | 28 | 32 | 50 | 54 => {
            ipv4(code, value)?
        }
        OPT_TIME_OFFSET => OptionValue::I32(i32::from_be_bytes(exact::<4>(code, value)?)),
        25 => OptionValue::U16List(u16_list(code, value)?),
        53 => {
            let b = value.first().copied().ok_or(WireError::MalformedOption(code as u16))?;
            if !(1..=8).contains(&b) {
                return Err(WireError::MalformedOption(code as u16));
            }
            OptionValue::MessageType(b)
        }
        61 => {
            if value.is_empty() {
                return Err(WireError::MalformedOption(code as u16));
            }
            OptionValue::ClientIdentifier { htype: value[0], id: value[1..].to_vec() }
        }
        55 | 60 => OptionValue::U8List(value.to_vec()),
        OPT_CLASSLESS_STATIC_ROUTE => OptionValue::ClasslessStaticRoutes(decode_classless_routes(value)?),
        c if is_ipv4_list_code(c) => ipv4_list(c, value)?,
        c if is_text_code(c) => OptionValue::Text(
            String::from_utf8(value.to_vec()).map_err(|_| WireError::MalformedOption(c as u16))?,
        ),
        c if is_u16_code(c) => OptionValue::U16(u16::from_be_bytes(exact::<2>(c, value)?)),
        c if is_bool_code(c) => {
            let b = value.first().copied().ok_or(WireError::MalformedOption(c as u16))?;
            if b > 1 {
                return Err(WireError::MalformedOption(c as u16));
            }
            OptionValue::Bool(b == 1)
        }
        c if is_ip_mask_pair_code(c) => OptionValue::IpMaskPairs(ip_mask_pairs(c, value)?),
        c if is_u8_code(c) => OptionValue::U8(value.first().copied().ok_or(WireError::MalformedOption(c as u16))?),
        c if is_u32_code(c) => OptionValue::U32(u32::from_be_bytes(exact::<4>(c, value)?)),
        _ => OptionValue::Unknown(value.to_vec()),
    })
}

fn exact<const N: usize>(code: u8, value: &[u8]) -> Result<[u8; N], WireError> {
    value.try_into().map_err(|_| WireError::MalformedOption(code as u16))
}

fn ipv4(code: u8, value: &[u8]) -> Result<OptionValue, WireError> {
    let b: [u8; 4] = exact(code, value)?;
    Ok(OptionValue::Ipv4(Ipv4Addr::from(b)))
}

fn ipv4_list(code: u8, value: &[u8]) -> Result<OptionValue, WireError> {
    if value.len() % 4 != 0 {
        return Err(WireError::MalformedOption(code as u16));
    }
    Ok(OptionValue::Ipv4List(
        value.chunks_exact(4).map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3])).collect(),
    ))
}

fn u16_list(code: u8, value: &[u8]) -> Result<Vec<u16>, WireError> {
    if value.len() % 2 != 0 {
        return Err(WireError::MalformedOption(code as u16));
    }
    Ok(value.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

fn ip_mask_pairs(code: u8, value: &[u8]) -> Result<Vec<(Ipv4Addr, Ipv4Addr)>, WireError> {
    if value.len() % 8 != 0 {
        return Err(WireError::MalformedOption(code as u16));
    }
    Ok(value
        .chunks_exact(8)
        .map(|c| {
            (
                Ipv4Addr::new(c[0], c[1], c[2], c[3]),
                Ipv4Addr::new(c[4], c[5], c[6], c[7]),
            )
        })
        .collect())
}

/// Encode a typed value back into raw option bytes (the inverse of `decode_option`).
pub fn encode_value(value: &OptionValue) -> Vec<u8> {
    match value {
        OptionValue::Ipv4(a) => a.octets().to_vec(),
        OptionValue::Ipv4List(list) => list.iter().flat_map(|a| a.octets()).collect(),
        OptionValue::I32(v) => v.to_be_bytes().to_vec(),
        OptionValue::U32(v) => v.to_be_bytes().to_vec(),
        OptionValue::U16(v) => v.to_be_bytes().to_vec(),
        OptionValue::U16List(list) => list.iter().flat_map(|v| v.to_be_bytes()).collect(),
        OptionValue::U8(v) => vec![*v],
        OptionValue::U8List(list) => list.clone(),
        OptionValue::Bool(b) => vec![if *b { 1 } else { 0 }],
        OptionValue::Text(s) => s.as_bytes().to_vec(),
        OptionValue::IpMaskPairs(pairs) => pairs
            .iter()
            .flat_map(|(a, m)| a.octets().into_iter().chain(m.octets()))
            .collect(),
        OptionValue::MessageType(b) => vec![*b],
        OptionValue::ClientIdentifier { htype, id } => {
            let mut v = vec![*htype];
            v.extend_from_slice(id);
            v
        }
        OptionValue::ClasslessStaticRoutes(routes) => encode_classless_routes(routes),
        OptionValue::Unknown(bytes) => bytes.clone(),
    }
}

/// Decode option 121: a sequence of `(prefix_len, prefix_octets, router)`
/// entries, `prefix_octets` being `ceil(prefix_len/8)` bytes, consumed until
/// the value is exhausted.
pub fn decode_classless_routes(value: &[u8]) -> Result<Vec<ClasslessRoute>, WireError> {
    let mut routes = Vec::new();
    let mut i = 0;
    while i < value.len() {
        let prefix_len = value[i];
        if prefix_len > 32 {
            return Err(WireError::MalformedClasslessRoute);
        }
        i += 1;
        let octets = prefix_len.div_ceil(8) as usize;
        if i + octets + 4 > value.len() {
            return Err(WireError::MalformedClasslessRoute);
        }
        let mut dest_bytes = [0u8; 4];
        dest_bytes[..octets].copy_from_slice(&value[i..i + octets]);
        i += octets;
        let router = Ipv4Addr::new(value[i], value[i + 1], value[i + 2], value[i + 3]);
        i += 4;
        routes.push(ClasslessRoute {
            prefix_len,
            destination: Ipv4Addr::from(dest_bytes),
            router,
        });
    }
    Ok(routes)
}

pub fn encode_classless_routes(routes: &[ClasslessRoute]) -> Vec<u8> {
    let mut buf = Vec::new();
    for route in routes {
        buf.push(route.prefix_len);
        let octets = route.prefix_len.div_ceil(8) as usize;
        buf.extend_from_slice(&route.destination.octets()[..octets]);
        buf.extend_from_slice(&route.router.octets());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_basic_options() {
        let opts = vec![
            DhcpOption::msg_type(DHCPDISCOVER),
            DhcpOption::subnet_mask(Ipv4Addr::new(255, 255, 255, 0)),
            DhcpOption::new(OPT_PARAM_REQUEST, vec![1, 3, 6]),
        ];
        let bytes = encode_options(&opts);
        let parsed = parse_options(&bytes).unwrap();
        assert_eq!(parsed, opts);
    }

    #[test]
    fn zero_length_option_is_legal() {
        let bytes = encode_options(&[DhcpOption::new(250, vec![])]);
        let parsed = parse_options(&bytes).unwrap();
        assert_eq!(parsed, vec![DhcpOption::new(250, vec![])]);
    }

    #[test]
    fn truncated_option_is_an_error() {
        // code=1, length=4, but only 2 bytes of value follow
        let bytes = vec![1, 4, 0xFF, 0xFF];
        assert_eq!(parse_options(&bytes), Err(WireError::TruncatedOption));
    }

    #[test]
    fn duplicate_codes_preserved_in_order() {
        let opts = vec![
            DhcpOption::new(OPT_DNS_SERVER, vec![8, 8, 8, 8]),
            DhcpOption::new(OPT_DNS_SERVER, vec![1, 1, 1, 1]),
        ];
        let bytes = encode_options(&opts);
        let parsed = parse_options(&bytes).unwrap();
        assert_eq!(parsed, opts);
    }

    #[test]
    fn classless_static_route_example_s2() {
        let value = [24u8, 192, 168, 1, 10, 0, 0, 0];
        let routes = decode_classless_routes(&value).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].prefix_len, 24);
        assert_eq!(routes[0].destination, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(routes[0].router, Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn classless_static_route_roundtrips() {
        let routes = vec![
            ClasslessRoute { prefix_len: 24, destination: Ipv4Addr::new(10, 1, 2, 0), router: Ipv4Addr::new(10, 0, 0, 1) },
            ClasslessRoute { prefix_len: 0, destination: Ipv4Addr::UNSPECIFIED, router: Ipv4Addr::new(10, 0, 0, 1) },
        ];
        let bytes = encode_classless_routes(&routes);
        assert_eq!(decode_classless_routes(&bytes).unwrap(), routes);
    }

    #[test]
    fn message_type_must_be_in_range() {
        assert_eq!(decode_option(53, &[0]), Err(WireError::MalformedOption(53)));
        assert_eq!(decode_option(53, &[9]), Err(WireError::MalformedOption(53)));
        assert_eq!(decode_option(53, &[1]), Ok(OptionValue::MessageType(1)));
    }

    #[test]
    fn decode_encode_roundtrips_for_each_kind() {
        let cases = vec![
            (1u8, vec![255, 255, 255, 0]),
            (3, vec![10, 0, 0, 1, 10, 0, 0, 2]),
            (12, b"host".to_vec()),
            (13, vec![0, 64]),
            (19, vec![1]),
            (21, vec![10, 0, 0, 0, 255, 255, 255, 0]),
            (23, vec![64]),
            (24, vec![0, 0, 1, 0]),
            (25, vec![0, 200, 1, 144]),
            (55, vec![1, 3, 6]),
            (61, vec![1, 0xAA, 0xBB, 0xCC]),
        ];
        for (code, value) in cases {
            let decoded = decode_option(code, &value).unwrap();
            assert_eq!(encode_value(&decoded), value, "code {code}");
        }
    }
}
