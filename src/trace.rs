use std::fmt::Write;
#[cfg(test)] use mockall::automock;
use tracing::trace;

/// Receives a human readable account of everything that goes over the wire. This is separate
///  from the crate's own `tracing` events so that applications can capture raw packet dumps
///  per session.
#[cfg_attr(test, automock)]
pub trait Tracer: Send + Sync + 'static {
    fn print(&self, msg: &str);

    fn log_packet(&self, label: &str, packet: &[u8]);
}

pub struct NilTracer;

impl Tracer for NilTracer {
    fn print(&self, _msg: &str) {}
    fn log_packet(&self, _label: &str, _packet: &[u8]) {}
}

/// Forwards into `tracing` at TRACE level
pub struct LogTracer;

impl Tracer for LogTracer {
    fn print(&self, msg: &str) {
        trace!("{}", msg);
    }

    fn log_packet(&self, label: &str, packet: &[u8]) {
        trace!("{} ({} bytes)\n{}", label, packet.len(), hex_dump(packet));
    }
}

/// 16 bytes per line: offset, hex bytes, printable ASCII
pub fn hex_dump(data: &[u8]) -> String {
    let mut result = String::new();
    for (line_no, chunk) in data.chunks(16).enumerate() {
        let _ = write!(result, "{:08x}  ", line_no * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => { let _ = write!(result, "{:02x} ", b); }
                None => result.push_str("   "),
            }
            if i == 7 {
                result.push(' ');
            }
        }
        result.push_str(" |");
        for &b in chunk {
            result.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' });
        }
        result.push_str("|\n");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        let dump = hex_dump(b"\x00\x0b\x00\x00\x0cABCDEFGHIJKL");
        assert_eq!(dump,
            "00000000  00 0b 00 00 0c 41 42 43  44 45 46 47 48 49 4a 4b  |.....ABCDEFGHIJK|\n\
             00000010  4c                                                |L|\n");
    }

    #[test]
    fn test_hex_dump_empty() {
        assert_eq!(hex_dump(&[]), "");
    }
}
