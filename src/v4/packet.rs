//! DHCPv4 message codec: the 236-byte fixed header, magic cookie, and TLV
//! option stream, including option-52 overload reparse of `file`/`sname`.
//!
//! Grounded on `hr-dhcp::packet::DhcpPacket`, extended with overload
//! handling.

use std::net::Ipv4Addr;

use crate::error::WireError;
use crate::v4::options::{self, DhcpOption, OPT_OVERLOAD};

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const FIXED_HEADER_LEN: usize = 236;
const MIN_PACKET_LEN: usize = FIXED_HEADER_LEN + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<DhcpOption>,
}

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
const BROADCAST_FLAG: u16 = 0x8000;

impl Message {
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < MIN_PACKET_LEN {
            return Err(WireError::TooShort(data.len()));
        }
        if data[236..240] != MAGIC_COOKIE {
            return Err(WireError::BadMagicCookie);
        }

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);
        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);
        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let mut options = options::parse_options(&data[240..])?;

        // Option 52 overload: reparse file/sname as additional option
        // streams and append them.
        if let Some(overload) = options.iter().find(|o| o.code == OPT_OVERLOAD).and_then(|o| o.as_u8()) {
            if overload == 1 || overload == 3 {
                options.extend(options::parse_options(&file)?);
            }
            if overload == 2 || overload == 3 {
                options.extend(options::parse_options(&sname)?);
            }
        }

        Ok(Message {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr,
            sname,
            file,
            options,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(300);
        buf.push(self.op);
        buf.push(self.htype);
        buf.push(self.hlen);
        buf.push(self.hops);
        buf.extend_from_slice(&self.xid.to_be_bytes());
        buf.extend_from_slice(&self.secs.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.ciaddr.octets());
        buf.extend_from_slice(&self.yiaddr.octets());
        buf.extend_from_slice(&self.siaddr.octets());
        buf.extend_from_slice(&self.giaddr.octets());
        buf.extend_from_slice(&self.chaddr);
        buf.extend_from_slice(&self.sname);
        buf.extend_from_slice(&self.file);
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&options::encode_options(&self.options));
        buf
    }

    pub fn mac_bytes(&self) -> &[u8] {
        let len = (self.hlen as usize).min(16);
        &self.chaddr[..len]
    }

    pub fn get_option(&self, code: u8) -> Option<&DhcpOption> {
        self.options.iter().find(|o| o.code == code)
    }

    pub fn msg_type(&self) -> Option<u8> {
        self.get_option(options::OPT_MSG_TYPE)?.as_u8()
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.get_option(options::OPT_REQUESTED_IP)?.as_ipv4()
    }

    pub fn server_id(&self) -> Option<Ipv4Addr> {
        self.get_option(options::OPT_SERVER_ID)?.as_ipv4()
    }

    pub fn hostname(&self) -> Option<String> {
        self.get_option(options::OPT_HOSTNAME)?.as_str()
    }

    /// Client identity key: option 61 if present, otherwise `chaddr[0..hlen]`.
    pub fn client_key(&self) -> Vec<u8> {
        match self.get_option(options::OPT_CLIENT_ID) {
            Some(opt) => opt.data.clone(),
            None => self.mac_bytes().to_vec(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags & BROADCAST_FLAG != 0
    }

    /// Build a reply sharing this request's transaction identity
    /// (`htype`, `hlen`, `xid`, `chaddr`, `flags` copied from the request).
    pub fn build_reply(
        &self,
        msg_type: u8,
        yiaddr: Ipv4Addr,
        siaddr: Ipv4Addr,
        ciaddr: Ipv4Addr,
        mut options: Vec<DhcpOption>,
    ) -> Message {
        let mut opts = vec![DhcpOption::msg_type(msg_type)];
        opts.append(&mut options);
        Message {
            op: BOOTREPLY,
            htype: self.htype,
            hlen: self.hlen,
            hops: 0,
            xid: self.xid,
            secs: 0,
            flags: self.flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr: self.giaddr,
            chaddr: self.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: opts,
        }
    }
}
