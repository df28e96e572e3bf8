use bytes::{Buf, BufMut, Bytes};
use crate::packet::{PacketHeader, PacketType, TnsPacket, HEADER_LEN};
use crate::util::safe_converter::SafeCast;

/// Carries one segment of a logical message after the handshake:
///
/// ```ascii
///  8: data flags (u16)
/// 10: payload
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataPacket {
    pub flag: u8,
    pub data_flag: u16,
    pub buffer: Bytes,
}

impl DataPacket {
    pub const DATA_OFFSET: u16 = 10;

    /// The sender closes the session after this packet
    pub const FLAG_EOF: u16 = 0x0040;

    pub fn new(data_flag: u16, buffer: Bytes) -> DataPacket {
        DataPacket {
            flag: 0,
            data_flag,
            buffer,
        }
    }

    /// Maximum payload that fits into a single packet
    pub const MAX_PAYLOAD_LEN: usize = (u16::MAX - Self::DATA_OFFSET) as usize;
}

impl TnsPacket for DataPacket {
    const PACKET_TYPE: PacketType = PacketType::Data;

    /// NB: callers segment payloads to at most [DataPacket::MAX_PAYLOAD_LEN] bytes
    fn ser(&self, buf: &mut impl BufMut) {
        let payload = &self.buffer[..self.buffer.len().min(Self::MAX_PAYLOAD_LEN)];
        PacketHeader {
            length: Self::DATA_OFFSET + payload.len() as u16,
            packet_type: PacketType::Data,
            flag: self.flag,
        }.ser(buf);
        buf.put_u16(self.data_flag);
        buf.put_slice(payload);
    }

    fn deser(raw: &[u8]) -> anyhow::Result<DataPacket> {
        let header = PacketHeader::expect(raw, PacketType::Data, Self::DATA_OFFSET.safe_cast())?;
        let mut buf = &raw[HEADER_LEN..];
        let data_flag = buf.try_get_u16()?;

        Ok(DataPacket {
            flag: header.flag,
            data_flag,
            buffer: Bytes::copy_from_slice(buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty(0)]
    #[case::one(1)]
    #[case::bigger(8000)]
    fn test_round_trip(#[case] len: usize) {
        let packet = DataPacket::new(0, Bytes::from(vec![7u8; len]));
        let raw = packet.to_bytes();
        assert_eq!(raw.len(), 10 + len);
        assert_eq!(usize::from(u16::from_be_bytes([raw[0], raw[1]])), 10 + len);
        assert_eq!(raw[4], 6);

        let parsed = DataPacket::deser(&raw).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.to_bytes(), raw);
    }

    #[test]
    fn test_data_flag() {
        let raw = DataPacket::new(DataPacket::FLAG_EOF, Bytes::new()).to_bytes();
        assert_eq!(raw.as_ref(), &[0, 10, 0, 0, 6, 0, 0, 0, 0, 0x40]);
        assert_eq!(DataPacket::deser(&raw).unwrap().data_flag, DataPacket::FLAG_EOF);
    }

    #[rstest]
    #[case::truncated_header(vec![0, 10, 0, 0, 6, 0, 0, 0, 0])]
    #[case::length_mismatch(vec![0, 12, 0, 0, 6, 0, 0, 0, 0, 0, 1])]
    #[case::marker(vec![0, 11, 0, 0, 12, 0, 0, 0, 1, 0, 2])]
    fn test_deser_invalid(#[case] raw: Vec<u8>) {
        assert!(DataPacket::deser(&raw).is_err());
    }
}
