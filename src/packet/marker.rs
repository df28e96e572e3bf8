use bytes::{Buf, BufMut};
use crate::packet::{PacketHeader, PacketType, TnsPacket, HEADER_LEN};

/// Out-of-band control packet for break / reset / interrupt, always 11 bytes:
///
/// ```ascii
///  8: marker type (u8)
///  9: reserved (u8)
/// 10: marker data (u8)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerPacket {
    pub flag: u8,
    pub marker_type: u8,
    pub marker_data: u8,
}

impl MarkerPacket {
    pub const LEN: u16 = 11;

    pub const TYPE_BREAK: u8 = 0;
    pub const TYPE_RESET_CAPABLE: u8 = 1;

    pub const DATA_RESET: u8 = 2;
    pub const DATA_INTERRUPT: u8 = 3;

    /// A marker as the client sends it
    pub fn new(marker_data: u8) -> MarkerPacket {
        MarkerPacket {
            flag: 0,
            marker_type: Self::TYPE_RESET_CAPABLE,
            marker_data,
        }
    }
}

impl TnsPacket for MarkerPacket {
    const PACKET_TYPE: PacketType = PacketType::Marker;

    fn ser(&self, buf: &mut impl BufMut) {
        PacketHeader {
            length: Self::LEN,
            packet_type: PacketType::Marker,
            flag: self.flag,
        }.ser(buf);
        buf.put_u8(self.marker_type);
        buf.put_u8(0);
        buf.put_u8(self.marker_data);
    }

    fn deser(raw: &[u8]) -> anyhow::Result<MarkerPacket> {
        let header = PacketHeader::expect(raw, PacketType::Marker, Self::LEN.into())?;
        if raw.len() != usize::from(Self::LEN) {
            return Err(super::framing_error(format!("marker packet has {} bytes instead of {}", raw.len(), Self::LEN)));
        }

        let mut buf = &raw[HEADER_LEN..];
        let marker_type = buf.try_get_u8()?;
        let _reserved = buf.try_get_u8()?;
        let marker_data = buf.try_get_u8()?;

        Ok(MarkerPacket {
            flag: header.flag,
            marker_type,
            marker_data,
        })
    }
}
