//! TNS packets.
//!
//! Every packet starts with the same 8-byte header (all integers big-endian):
//!
//! ```ascii
//! 0: total packet length in bytes, including this header (u16)
//! 2: packet checksum, always 0 (u16)
//! 4: packet type (u8)
//! 5: flags (u8)
//! 6: header checksum, always 0 (u16)
//! ```
//!
//! The body layout is fixed per packet type, see the submodules. Parsing is strict: a length
//!  field that does not match the number of bytes, a wrong type byte or a body that is too
//!  short are framing errors.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::error::TnsError;

pub mod accept;
pub mod connect;
pub mod data;
pub mod marker;
pub mod redirect;
pub mod refuse;

pub use accept::AcceptPacket;
pub use connect::ConnectPacket;
pub use data::DataPacket;
pub use marker::MarkerPacket;
pub use redirect::RedirectPacket;
pub use refuse::RefusePacket;

pub const HEADER_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Accept = 2,
    Ack = 3,
    Refuse = 4,
    Redirect = 5,
    Data = 6,
    Null = 7,
    Abort = 9,
    Resend = 11,
    Marker = 12,
    Attention = 13,
    Control = 14,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u16,
    pub packet_type: PacketType,
    pub flag: u8,
}

impl PacketHeader {
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.length);
        buf.put_u16(0);
        buf.put_u8(self.packet_type.into());
        buf.put_u8(self.flag);
        buf.put_u16(0);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketHeader> {
        let length = buf.try_get_u16()?;
        let _packet_checksum = buf.try_get_u16()?;
        let raw_type = buf.try_get_u8()?;
        let packet_type = PacketType::try_from(raw_type)
            .map_err(|_| framing_error(format!("unknown packet type {}", raw_type)))?;
        let flag = buf.try_get_u8()?;
        let _header_checksum = buf.try_get_u16()?;

        Ok(PacketHeader {
            length,
            packet_type,
            flag,
        })
    }

    /// Parses the header of a complete raw packet and checks it against what the caller expects
    pub(crate) fn expect(raw: &[u8], expected: PacketType, min_len: usize) -> anyhow::Result<PacketHeader> {
        if raw.len() < min_len.max(HEADER_LEN) {
            return Err(framing_error(format!("{:?} packet of {} bytes is shorter than the minimum of {}", expected, raw.len(), min_len)));
        }
        let header = PacketHeader::deser(&mut &raw[..HEADER_LEN])?;
        if header.packet_type != expected {
            return Err(framing_error(format!("expected a {:?} packet, got {:?}", expected, header.packet_type)));
        }
        if usize::from(header.length) != raw.len() {
            return Err(framing_error(format!("length field {} does not match the packet's {} bytes", header.length, raw.len())));
        }
        Ok(header)
    }
}

pub(crate) fn framing_error(msg: impl Into<String>) -> anyhow::Error {
    TnsError::Framing(msg.into()).into()
}

/// Serialization contract shared by all packet kinds
pub trait TnsPacket: Sized {
    const PACKET_TYPE: PacketType;

    fn ser(&self, buf: &mut impl BufMut);

    fn deser(raw: &[u8]) -> anyhow::Result<Self>;

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.ser(&mut buf);
        buf.freeze()
    }
}

/// A successfully parsed packet of one of the kinds the session handles
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    Accept(AcceptPacket),
    Refuse(RefusePacket),
    Redirect(RedirectPacket),
    Data(DataPacket),
    Marker(MarkerPacket),
}

impl Packet {
    pub fn parse(raw: &[u8]) -> anyhow::Result<Packet> {
        let header = PacketHeader::deser(&mut &raw[..])?;
        let packet = match header.packet_type {
            PacketType::Connect => Packet::Connect(ConnectPacket::deser(raw)?),
            PacketType::Accept => Packet::Accept(AcceptPacket::deser(raw)?),
            PacketType::Refuse => Packet::Refuse(RefusePacket::deser(raw)?),
            PacketType::Redirect => Packet::Redirect(RedirectPacket::deser(raw)?),
            PacketType::Data => Packet::Data(DataPacket::deser(raw)?),
            PacketType::Marker => Packet::Marker(MarkerPacket::deser(raw)?),
            other => return Err(framing_error(format!("unsupported packet type {:?}", other))),
        };
        Ok(packet)
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Accept(_) => PacketType::Accept,
            Packet::Refuse(_) => PacketType::Refuse,
            Packet::Redirect(_) => PacketType::Redirect,
            Packet::Data(_) => PacketType::Data,
            Packet::Marker(_) => PacketType::Marker,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Packet::Connect(p) => p.to_bytes(),
            Packet::Accept(p) => p.to_bytes(),
            Packet::Refuse(p) => p.to_bytes(),
            Packet::Redirect(p) => p.to_bytes(),
            Packet::Data(p) => p.to_bytes(),
            Packet::Marker(p) => p.to_bytes(),
        }
    }
}
