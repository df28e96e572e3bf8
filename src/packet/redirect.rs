use bytes::{Buf, BufMut};
use crate::packet::{framing_error, PacketHeader, PacketType, TnsPacket, HEADER_LEN};
use crate::util::safe_converter::{wire_len, SafeCast};

/// Tells the client to connect somewhere else. Body layout:
///
/// ```ascii
///  8: redirect data length (u16)
/// 10: redirect data, if the packet has room for it
/// ```
///
/// If the packet ends after the length field, the redirect data arrives as the payload of the
///  next Data packet. With flag bit 0x02 set, the redirect data is the address, a NUL byte and
///  an opaque reconnect blob that replaces the connect descriptor on the next attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectPacket {
    pub flag: u8,
    pub redirect_addr: String,
    pub reconnect_data: String,
    /// set while the redirect data is still expected in a separate Data packet
    deferred_len: Option<u16>,
}

impl RedirectPacket {
    pub const DATA_OFFSET: u16 = 10;
    pub const FLAG_RECONNECT_DATA: u8 = 0x02;

    pub fn new(redirect_addr: impl Into<String>, reconnect_data: Option<String>) -> RedirectPacket {
        let (flag, reconnect_data) = match reconnect_data {
            Some(data) => (Self::FLAG_RECONNECT_DATA, data),
            None => (0, String::new()),
        };
        RedirectPacket {
            flag,
            redirect_addr: redirect_addr.into(),
            reconnect_data,
            deferred_len: None,
        }
    }

    /// The redirect data did not fit into this packet, it follows in a Data packet
    pub fn is_payload_deferred(&self) -> bool {
        self.deferred_len.is_some()
    }

    /// Installs the redirect data received in the Data packet following a header-only Redirect
    pub fn attach_payload(&mut self, data: &[u8]) {
        self.deferred_len = None;
        self.split_payload(data);
    }

    fn split_payload(&mut self, data: &[u8]) {
        let nul = data.iter().position(|&b| b == 0);
        match nul {
            Some(pos) if pos > 0 && self.flag & Self::FLAG_RECONNECT_DATA != 0 => {
                self.redirect_addr = String::from_utf8_lossy(&data[..pos]).into_owned();
                self.reconnect_data = String::from_utf8_lossy(&data[pos + 1..]).into_owned();
            }
            _ => {
                self.redirect_addr = String::from_utf8_lossy(data).into_owned();
                self.reconnect_data = String::new();
            }
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut result = self.redirect_addr.as_bytes().to_vec();
        if self.flag & Self::FLAG_RECONNECT_DATA != 0 {
            result.push(0);
            result.extend_from_slice(self.reconnect_data.as_bytes());
        }
        result
    }

    /// Looks up `(KEY=value)` in the redirect address, ignoring the case of the key
    pub fn find_value(&self, key: &str) -> Option<String> {
        let upper = self.redirect_addr.to_ascii_uppercase();
        let key = key.to_ascii_uppercase();
        upper.match_indices('(')
            .find_map(|(pos, _)| {
                let rest = upper[pos + 1..].trim_start().strip_prefix(key.as_str())?;
                rest.trim_start().strip_prefix('=')?;
                // same offsets in the original text to preserve the value's case
                let value_start = pos + 1 + self.redirect_addr[pos + 1..].find('=')? + 1;
                let value_len = self.redirect_addr[value_start..].find(')')?;
                Some(self.redirect_addr[value_start..value_start + value_len].trim().to_string())
            })
            .filter(|value| !value.is_empty())
    }

    pub fn protocol(&self) -> Option<String> {
        self.find_value("PROTOCOL").map(|p| p.to_ascii_lowercase())
    }

    pub fn host(&self) -> Option<String> {
        self.find_value("HOST")
    }

    pub fn port(&self) -> anyhow::Result<Option<u16>> {
        match self.find_value("PORT") {
            None => Ok(None),
            Some(port) => port.parse()
                .map(Some)
                .map_err(|_| anyhow::anyhow!("redirect packet with wrong port: {}", port)),
        }
    }
}

impl TnsPacket for RedirectPacket {
    const PACKET_TYPE: PacketType = PacketType::Redirect;

    fn ser(&self, buf: &mut impl BufMut) {
        if let Some(data_len) = self.deferred_len {
            PacketHeader {
                length: Self::DATA_OFFSET,
                packet_type: PacketType::Redirect,
                flag: self.flag,
            }.ser(buf);
            buf.put_u16(data_len);
            return;
        }

        let payload = self.payload();
        let payload_len = payload.len().min(usize::from(u16::MAX - Self::DATA_OFFSET)) as u16;
        PacketHeader {
            length: Self::DATA_OFFSET + payload_len,
            packet_type: PacketType::Redirect,
            flag: self.flag,
        }.ser(buf);
        buf.put_u16(payload_len);
        buf.put_slice(&payload[..usize::from(payload_len)]);
    }

    fn deser(raw: &[u8]) -> anyhow::Result<RedirectPacket> {
        let header = PacketHeader::expect(raw, PacketType::Redirect, Self::DATA_OFFSET.safe_cast())?;

        let mut buf = &raw[HEADER_LEN..];
        let data_len = buf.try_get_u16()?;

        let mut result = RedirectPacket {
            flag: header.flag,
            redirect_addr: String::new(),
            reconnect_data: String::new(),
            deferred_len: None,
        };

        if header.length <= Self::DATA_OFFSET {
            result.deferred_len = Some(data_len);
            return Ok(result);
        }
        if wire_len(buf.len())? != data_len {
            return Err(framing_error(format!("redirect packet declares {} bytes of data but carries {}", data_len, buf.len())));
        }
        result.split_payload(buf);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ADDR: &str = "(ADDRESS=(PROTOCOL=TCP)(HOST=Db2.Example.com)(PORT=1522))";
    const BLOB: &str = "(DESCRIPTION=(CONNECT_DATA=(SERVICE_NAME=ORCL)(SERVER=dedicated)))";

    #[test]
    fn test_round_trip_with_reconnect_data() {
        let packet = RedirectPacket::new(ADDR, Some(BLOB.to_string()));
        let raw = packet.to_bytes();
        assert_eq!(raw[5], RedirectPacket::FLAG_RECONNECT_DATA);
        assert_eq!(usize::from(u16::from_be_bytes([raw[8], raw[9]])), ADDR.len() + 1 + BLOB.len());
        assert_eq!(raw[10 + ADDR.len()], 0);

        let parsed = RedirectPacket::deser(&raw).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.to_bytes(), raw);
        assert_eq!(parsed.reconnect_data, BLOB);
    }

    #[test]
    fn test_round_trip_address_only() {
        let packet = RedirectPacket::new(ADDR, None);
        let raw = packet.to_bytes();
        assert_eq!(raw.len(), 10 + ADDR.len());

        let parsed = RedirectPacket::deser(&raw).unwrap();
        assert_eq!(parsed.redirect_addr, ADDR);
        assert_eq!(parsed.reconnect_data, "");
        assert_eq!(parsed.to_bytes(), raw);
    }

    #[test]
    fn test_nul_without_flag_is_part_of_address() {
        let mut raw = vec![0, 0, 0, 0, 5, 0, 0, 0, 0, 3, b'a', 0, b'b'];
        raw[1] = raw.len() as u8;
        let parsed = RedirectPacket::deser(&raw).unwrap();
        assert_eq!(parsed.redirect_addr, "a\0b");
        assert_eq!(parsed.reconnect_data, "");
    }

    #[test]
    fn test_deferred_payload() {
        let raw = [0, 10, 0, 0, 5, 2, 0, 0, 0, 5];
        let mut parsed = RedirectPacket::deser(&raw).unwrap();
        assert!(parsed.is_payload_deferred());
        assert_eq!(parsed.to_bytes().as_ref(), &raw);

        parsed.attach_payload(b"addr\0blob");
        assert!(!parsed.is_payload_deferred());
        assert_eq!(parsed.redirect_addr, "addr");
        assert_eq!(parsed.reconnect_data, "blob");
    }

    #[test]
    fn test_length_mismatch() {
        let raw = [0, 12, 0, 0, 5, 0, 0, 0, 0, 5, b'a', b'b'];
        assert!(RedirectPacket::deser(&raw).is_err());
    }

    #[test]
    fn test_address_values() {
        let packet = RedirectPacket::new(ADDR, None);
        assert_eq!(packet.protocol().as_deref(), Some("tcp"));
        assert_eq!(packet.host().as_deref(), Some("Db2.Example.com"));
        assert_eq!(packet.port().unwrap(), Some(1522));
    }

    #[rstest]
    #[case::lower_case_keys("(address=(protocol=tcp)(host=h)(port=1))", Some("h"), Some(1))]
    #[case::no_port("(ADDRESS=(HOST=h))", Some("h"), None)]
    #[case::nothing("", None, None)]
    fn test_address_value_variants(#[case] addr: &str, #[case] host: Option<&str>, #[case] port: Option<u16>) {
        let packet = RedirectPacket::new(addr, None);
        assert_eq!(packet.host().as_deref(), host);
        assert_eq!(packet.port().unwrap(), port);
    }

    #[test]
    fn test_wrong_port() {
        let packet = RedirectPacket::new("(ADDRESS=(HOST=h)(PORT=abc))", None);
        assert!(packet.port().is_err());
    }
}
