//! DHCPv6 message codec: 4-byte header, no framing markers, straightforward
//! concatenation to serialize.

use crate::error::WireError;
use crate::v6::options::{self, RawOption};

pub const MSG_SOLICIT: u8 = 1;
pub const MSG_ADVERTISE: u8 = 2;
pub const MSG_REQUEST: u8 = 3;
pub const MSG_CONFIRM: u8 = 4;
pub const MSG_RENEW: u8 = 5;
pub const MSG_REBIND: u8 = 6;
pub const MSG_REPLY: u8 = 7;
pub const MSG_RELEASE: u8 = 8;
pub const MSG_DECLINE: u8 = 9;
pub const MSG_INFORMATION_REQUEST: u8 = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: u8,
    pub transaction_id: [u8; 3],
    pub options: Vec<RawOption>,
}

impl Message {
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < 4 {
            return Err(WireError::TooShort(data.len()));
        }
        let msg_type = data[0];
        let transaction_id = [data[1], data[2], data[3]];
        let options = options::parse_options(&data[4..])?;
        Ok(Message { msg_type, transaction_id, options })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 64);
        buf.push(self.msg_type);
        buf.extend_from_slice(&self.transaction_id);
        buf.extend_from_slice(&options::encode_options(&self.options));
        buf
    }

    pub fn get_option(&self, code: u16) -> Option<&RawOption> {
        options::find(&self.options, code)
    }

    pub fn get_all(&self, code: u16) -> impl Iterator<Item = &RawOption> {
        options::find_all(&self.options, code)
    }

    pub fn client_duid(&self) -> Option<&[u8]> {
        self.get_option(options::OPT_CLIENTID).map(|o| o.data.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_p2() {
        let msg = Message {
            msg_type: MSG_SOLICIT,
            transaction_id: [1, 2, 3],
            options: vec![RawOption::new(options::OPT_CLIENTID, b"test-client-duid".to_vec())],
        };
        let bytes = msg.serialize();
        let parsed = Message::parse(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn too_short_is_rejected() {
        assert_eq!(Message::parse(&[1, 2]), Err(WireError::TooShort(2)));
    }

    #[test]
    fn message_with_no_options_parses() {
        let msg = Message::parse(&[MSG_SOLICIT, 0, 0, 0]).unwrap();
        assert_eq!(msg.options, vec![]);
    }
}
