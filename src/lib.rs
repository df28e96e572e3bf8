//! Client side of Oracle's TNS transport and the TTC session layer on top of it.
//!
//! [packet] has the wire format of the individual TNS packets, [codec] the TTC primitive
//!  encodings, and [session] the engine that ties them together: handshake, segmentation and
//!  reassembly of logical messages, the marker sub-protocol and RESEND handling.

pub mod codec;
pub mod config;
pub mod error;
pub mod packet;
pub mod session;
pub mod strconv;
pub mod summary;
pub mod trace;
pub mod util;

#[cfg(test)]
mod test_util;
