//! TTC value encodings carried inside Data packets.
//!
//! * compressed integer: one length byte, then the big-endian value without leading zero
//!   bytes. `0` is the single byte `0`. Bit `0x80` of the length byte marks a negative value,
//!   the bytes then hold its magnitude.
//! * fixed integer: exactly `size` bytes in the requested byte order
//! * CLR: `0` for an empty run, one length byte and up to 64 bytes, or for longer runs `0xFE`
//!   followed by chunks of at most 64 bytes, each with its own length byte, terminated by `0`
//! * DLC: compressed total length, followed by a CLR that may be longer than that length

pub mod reader;
pub mod writer;

pub use reader::{DecodeError, TtcReader};
pub use writer::TtcBufMut;

pub const CLR_MAX_SHORT: usize = 0x40;
pub const CLR_CHUNKED: u8 = 0xFE;
pub const CLR_NULL: u8 = 0xFF;
pub const CLR_ERROR: u8 = 0xFD;

pub const COMPRESSED_NEGATIVE: u8 = 0x80;
