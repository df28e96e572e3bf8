use bytes::{Buf, BufMut, Bytes};
use crate::packet::{framing_error, PacketHeader, PacketType, TnsPacket, HEADER_LEN};
use crate::session::SessionContext;
use crate::util::safe_converter::{wire_len, SafeCast};

/// The first packet of every handshake. Body layout (offsets from the start of the packet):
///
/// ```ascii
///  8: version (u16)
/// 10: lowest supported version (u16)
/// 12: service options (u16)
/// 14: session data unit (u16)
/// 16: transport data unit (u16)
/// 18: protocol characteristics, 0x4F98 (u16)
/// 20: max packets before ack, 0 (u16)
/// 22: "our one" / histone, 1 (u16)
/// 24: connect data length (u16)
/// 26: connect data offset, 58 (u16)
/// 28: max receivable connect data, 0 (u32)
/// 32: ACFL0 (u8)
/// 33: ACFL1 (u8)
/// 34: zero padding up to the connect data
/// 58: connect data, if it fits
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPacket {
    pub flag: u8,
    pub version: u16,
    pub lo_version: u16,
    pub options: u16,
    pub session_data_unit: u16,
    pub transport_data_unit: u16,
    pub histone: u16,
    pub acfl0: u8,
    pub acfl1: u8,
    /// declared length of the connect descriptor, also when it is not carried inline
    pub connect_data_len: u16,
    /// empty if this packet was parsed and the descriptor follows in a Data packet
    pub connect_data: Bytes,
}

impl ConnectPacket {
    pub const DATA_OFFSET: u16 = 58;
    /// Descriptors longer than this are sent in a separate Data packet following the Connect packet
    pub const MAX_INLINE_CONNECT_DATA: usize = 230;

    const PROTOCOL_CHARACTERISTICS: u16 = 0x4F98;
    const PADDING_LEN: usize = 24;

    pub fn new(context: &SessionContext, connect_data: &[u8]) -> anyhow::Result<ConnectPacket> {
        Ok(ConnectPacket {
            flag: 0,
            version: context.version,
            lo_version: context.lo_version,
            options: context.options,
            session_data_unit: context.session_data_unit,
            transport_data_unit: context.transport_data_unit,
            histone: 1,
            acfl0: 4,
            acfl1: 4,
            connect_data_len: wire_len(connect_data.len())?,
            connect_data: Bytes::copy_from_slice(connect_data),
        })
    }

    /// `true` if the descriptor does not fit into the packet and is sent as a Data packet
    pub fn is_data_deferred(&self) -> bool {
        usize::from(self.connect_data_len) > Self::MAX_INLINE_CONNECT_DATA
    }

    fn packet_len(&self) -> u16 {
        if self.is_data_deferred() {
            Self::DATA_OFFSET
        }
        else {
            Self::DATA_OFFSET + self.connect_data_len
        }
    }
}

impl TnsPacket for ConnectPacket {
    const PACKET_TYPE: PacketType = PacketType::Connect;

    fn ser(&self, buf: &mut impl BufMut) {
        PacketHeader {
            length: self.packet_len(),
            packet_type: PacketType::Connect,
            flag: self.flag,
        }.ser(buf);

        buf.put_u16(self.version);
        buf.put_u16(self.lo_version);
        buf.put_u16(self.options);
        buf.put_u16(self.session_data_unit);
        buf.put_u16(self.transport_data_unit);
        buf.put_u16(Self::PROTOCOL_CHARACTERISTICS);
        buf.put_u16(0);
        buf.put_u16(self.histone);
        buf.put_u16(self.connect_data_len);
        buf.put_u16(Self::DATA_OFFSET);
        buf.put_u32(0);
        buf.put_u8(self.acfl0);
        buf.put_u8(self.acfl1);
        buf.put_bytes(0, Self::PADDING_LEN);
        if !self.is_data_deferred() {
            buf.put_slice(&self.connect_data);
        }
    }

    fn deser(raw: &[u8]) -> anyhow::Result<ConnectPacket> {
        let header = PacketHeader::expect(raw, PacketType::Connect, Self::DATA_OFFSET.safe_cast())?;

        let mut buf = &raw[HEADER_LEN..];
        let version = buf.try_get_u16()?;
        let lo_version = buf.try_get_u16()?;
        let options = buf.try_get_u16()?;
        let session_data_unit = buf.try_get_u16()?;
        let transport_data_unit = buf.try_get_u16()?;
        let _protocol_characteristics = buf.try_get_u16()?;
        let _max_packets_before_ack = buf.try_get_u16()?;
        let histone = buf.try_get_u16()?;
        let connect_data_len = buf.try_get_u16()?;
        let data_offset = buf.try_get_u16()?;
        let _max_receivable = buf.try_get_u32()?;
        let acfl0 = buf.try_get_u8()?;
        let acfl1 = buf.try_get_u8()?;

        if data_offset != Self::DATA_OFFSET {
            return Err(framing_error(format!("connect data offset {} is not {}", data_offset, Self::DATA_OFFSET)));
        }

        let mut result = ConnectPacket {
            flag: header.flag,
            version,
            lo_version,
            options,
            session_data_unit,
            transport_data_unit,
            histone,
            acfl0,
            acfl1,
            connect_data_len,
            connect_data: Bytes::new(),
        };
        if header.length != result.packet_len() {
            return Err(framing_error(format!("connect packet of {} bytes declares {} bytes of connect data", header.length, connect_data_len)));
        }
        if !result.is_data_deferred() {
            result.connect_data = Bytes::copy_from_slice(&raw[Self::DATA_OFFSET.safe_cast()..]);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use crate::config::ConnectionOption;

    fn context() -> SessionContext {
        let mut option = ConnectionOption::new("db", 1521, "ORCL");
        option.session_data_unit_size = 8192;
        option.transport_data_unit_size = 0xFFFF;
        SessionContext::new(&option)
    }

    #[test]
    fn test_layout() {
        let packet = ConnectPacket::new(&context(), b"(DESCRIPTION=)").unwrap();
        let raw = packet.to_bytes();

        assert_eq!(raw.len(), 58 + 14);
        assert_eq!(&raw[0..2], &[0, 72]);
        assert_eq!(raw[4], 1);
        assert_eq!(&raw[8..10], &312u16.to_be_bytes());
        assert_eq!(&raw[10..12], &300u16.to_be_bytes());
        assert_eq!(&raw[12..14], &(1u16 | 1024 | 2048).to_be_bytes());
        assert_eq!(&raw[14..16], &8192u16.to_be_bytes());
        assert_eq!(&raw[16..18], &0xFFFFu16.to_be_bytes());
        assert_eq!(&raw[18..20], &[79, 152]);
        assert_eq!(&raw[22..24], &[0, 1]);
        assert_eq!(&raw[24..26], &[0, 14]);
        assert_eq!(&raw[26..28], &[0, 58]);
        assert_eq!(raw[32], 4);
        assert_eq!(raw[33], 4);
        assert_eq!(&raw[58..], b"(DESCRIPTION=)");
    }

    #[rstest]
    #[case::empty(0)]
    #[case::short(14)]
    #[case::max_inline(230)]
    #[case::deferred(231)]
    #[case::long_deferred(2000)]
    fn test_round_trip(#[case] descriptor_len: usize) {
        let descriptor = vec![b'x'; descriptor_len];
        let packet = ConnectPacket::new(&context(), &descriptor).unwrap();
        let raw = packet.to_bytes();

        let parsed = ConnectPacket::deser(&raw).unwrap();
        assert_eq!(parsed.to_bytes(), raw);
        assert_eq!(parsed.connect_data_len as usize, descriptor_len);
        if descriptor_len > ConnectPacket::MAX_INLINE_CONNECT_DATA {
            assert!(parsed.is_data_deferred());
            assert_eq!(raw.len(), 58);
            assert!(parsed.connect_data.is_empty());
        }
        else {
            assert_eq!(parsed, packet);
        }
    }

    #[test]
    fn test_deser_truncated() {
        let raw = ConnectPacket::new(&context(), b"(DESCRIPTION=)").unwrap().to_bytes();
        assert!(ConnectPacket::deser(&raw[..raw.len() - 1]).is_err());
        assert!(ConnectPacket::deser(&raw[..40]).is_err());
    }
}
