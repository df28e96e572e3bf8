use bytes::{Buf, BufMut, Bytes};
use crate::packet::{framing_error, PacketHeader, PacketType, TnsPacket, HEADER_LEN};
use crate::util::safe_converter::{wire_len, SafeCast};

/// The server's answer to a successful Connect. Body layout:
///
/// ```ascii
///  8: version (u16)
/// 10: negotiated options (u16)
/// 12: session data unit (u16)
/// 14: transport data unit (u16)
/// 16: histone (u16)
/// 18: accept data length (u16)
/// 20: accept data offset, 32 (u16)
/// 22: ACFL0 (u8)
/// 23: ACFL1 (u8)
/// 24: reserved (u32)
/// 28: reconnect address start, relative to the packet (u16)
/// 30: reconnect address length (u16)
/// 32: accept data
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptPacket {
    pub flag: u8,
    pub version: u16,
    pub negotiated_options: u16,
    pub session_data_unit: u16,
    pub transport_data_unit: u16,
    pub histone: u16,
    pub acfl0: u8,
    pub acfl1: u8,
    pub reconnect_addr_start: u16,
    pub reconnect_addr_len: u16,
    pub buffer: Bytes,
}

impl AcceptPacket {
    pub const DATA_OFFSET: u16 = 32;

    pub fn new(version: u16, negotiated_options: u16, session_data_unit: u16, transport_data_unit: u16) -> AcceptPacket {
        AcceptPacket {
            flag: 0,
            version,
            negotiated_options,
            session_data_unit,
            transport_data_unit,
            histone: 1,
            acfl0: 0,
            acfl1: 0,
            reconnect_addr_start: 0,
            reconnect_addr_len: 0,
            buffer: Bytes::new(),
        }
    }

    /// Optional address the client should use to reconnect, located inside the accept data
    pub fn reconnect_addr(&self) -> Option<String> {
        let start: usize = self.reconnect_addr_start.safe_cast();
        let len: usize = self.reconnect_addr_len.safe_cast();
        if len == 0 || start < Self::DATA_OFFSET.safe_cast() {
            return None;
        }
        let start = start - usize::from(Self::DATA_OFFSET);
        self.buffer.get(start..start + len)
            .map(|addr| String::from_utf8_lossy(addr).into_owned())
    }
}

impl TnsPacket for AcceptPacket {
    const PACKET_TYPE: PacketType = PacketType::Accept;

    fn ser(&self, buf: &mut impl BufMut) {
        // accept data is limited to what fits into a packet, see deser
        let data_len = self.buffer.len().min(usize::from(u16::MAX - Self::DATA_OFFSET)) as u16;

        PacketHeader {
            length: Self::DATA_OFFSET + data_len,
            packet_type: PacketType::Accept,
            flag: self.flag,
        }.ser(buf);

        buf.put_u16(self.version);
        buf.put_u16(self.negotiated_options);
        buf.put_u16(self.session_data_unit);
        buf.put_u16(self.transport_data_unit);
        buf.put_u16(self.histone);
        buf.put_u16(data_len);
        buf.put_u16(Self::DATA_OFFSET);
        buf.put_u8(self.acfl0);
        buf.put_u8(self.acfl1);
        buf.put_u32(0);
        buf.put_u16(self.reconnect_addr_start);
        buf.put_u16(self.reconnect_addr_len);
        buf.put_slice(&self.buffer[..usize::from(data_len)]);
    }

    fn deser(raw: &[u8]) -> anyhow::Result<AcceptPacket> {
        let header = PacketHeader::expect(raw, PacketType::Accept, Self::DATA_OFFSET.safe_cast())?;

        let mut buf = &raw[HEADER_LEN..];
        let version = buf.try_get_u16()?;
        let negotiated_options = buf.try_get_u16()?;
        let session_data_unit = buf.try_get_u16()?;
        let transport_data_unit = buf.try_get_u16()?;
        let histone = buf.try_get_u16()?;
        let data_len = buf.try_get_u16()?;
        let data_offset = buf.try_get_u16()?;
        let acfl0 = buf.try_get_u8()?;
        let acfl1 = buf.try_get_u8()?;
        let _reserved = buf.try_get_u32()?;
        let reconnect_addr_start = buf.try_get_u16()?;
        let reconnect_addr_len = buf.try_get_u16()?;

        if data_offset != Self::DATA_OFFSET {
            return Err(framing_error(format!("accept data offset {} is not {}", data_offset, Self::DATA_OFFSET)));
        }
        let buffer = &raw[Self::DATA_OFFSET.safe_cast()..];
        if wire_len(buffer.len())? != data_len {
            return Err(framing_error(format!("accept packet declares {} bytes of data but carries {}", data_len, buffer.len())));
        }

        Ok(AcceptPacket {
            flag: header.flag,
            version,
            negotiated_options,
            session_data_unit,
            transport_data_unit,
            histone,
            acfl0,
            acfl1,
            reconnect_addr_start,
            reconnect_addr_len,
            buffer: Bytes::copy_from_slice(buffer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut packet = AcceptPacket::new(312, 0x0801, 8192, 0x7FFF);
        packet.acfl0 = 1;
        packet.acfl1 = 2;
        let raw = packet.to_bytes();

        assert_eq!(raw.len(), 32);
        assert_eq!(&raw[0..2], &[0, 32]);
        assert_eq!(raw[4], 2);
        assert_eq!(&raw[8..10], &312u16.to_be_bytes());
        assert_eq!(&raw[10..12], &[0x08, 0x01]);
        assert_eq!(&raw[12..14], &8192u16.to_be_bytes());
        assert_eq!(&raw[14..16], &0x7FFFu16.to_be_bytes());
        assert_eq!(&raw[20..22], &[0, 32]);
        assert_eq!(raw[22], 1);
        assert_eq!(raw[23], 2);
    }

    #[test]
    fn test_round_trip_with_reconnect_addr() {
        let addr = b"(ADDRESS=(PROTOCOL=tcp)(HOST=10.0.0.7)(PORT=1530))";
        let mut packet = AcceptPacket::new(312, 0, 8192, 8192);
        packet.buffer = Bytes::from([b"xy".as_slice(), addr.as_slice()].concat());
        packet.reconnect_addr_start = 34;
        packet.reconnect_addr_len = addr.len() as u16;

        let raw = packet.to_bytes();
        let parsed = AcceptPacket::deser(&raw).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.to_bytes(), raw);
        assert_eq!(parsed.reconnect_addr().as_deref(), Some("(ADDRESS=(PROTOCOL=tcp)(HOST=10.0.0.7)(PORT=1530))"));
    }

    #[test]
    fn test_reconnect_addr_out_of_range() {
        let mut packet = AcceptPacket::new(312, 0, 8192, 8192);
        packet.buffer = Bytes::from_static(b"abc");
        packet.reconnect_addr_start = 33;
        packet.reconnect_addr_len = 10;
        assert_eq!(packet.reconnect_addr(), None);

        packet.reconnect_addr_len = 0;
        assert_eq!(packet.reconnect_addr(), None);
    }

    #[test]
    fn test_deser_invalid() {
        let raw = AcceptPacket::new(312, 0, 8192, 8192).to_bytes();
        assert!(AcceptPacket::deser(&raw[..31]).is_err());

        let mut wrong_data_len = raw.to_vec();
        wrong_data_len[19] = 5;
        assert!(AcceptPacket::deser(&wrong_data_len).is_err());

        let mut wrong_offset = raw.to_vec();
        wrong_offset[21] = 40;
        assert!(AcceptPacket::deser(&wrong_offset).is_err());
    }
}
