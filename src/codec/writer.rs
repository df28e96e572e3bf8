use bytes::BufMut;
use crate::codec::{CLR_CHUNKED, CLR_MAX_SHORT, COMPRESSED_NEGATIVE};
use crate::util::safe_converter::PrecheckedCast;

/// The value's low `size` bytes, i.e. what a fixed-width encoding of that size would carry
fn truncate_to_size(value: u64, size: u8) -> u64 {
    if size >= 8 {
        value
    }
    else {
        value & ((1u64 << (8 * u32::from(size))) - 1)
    }
}

fn put_compressed(buf: &mut (impl BufMut + ?Sized), magnitude: u64, negative: bool) {
    let be = magnitude.to_be_bytes();
    let leading_zeros = be.iter().take_while(|&&b| b == 0).count();
    let significant = &be[leading_zeros..];

    let len: u8 = significant.len().prechecked_cast();
    if negative && len > 0 {
        buf.put_u8(len | COMPRESSED_NEGATIVE);
    }
    else {
        buf.put_u8(len);
    }
    buf.put_slice(significant);
}

fn put_fixed(buf: &mut (impl BufMut + ?Sized), value: u64, size: u8, big_endian: bool) {
    let size = usize::from(size.min(8));
    if big_endian {
        buf.put_slice(&value.to_be_bytes()[8 - size..]);
    }
    else {
        buf.put_slice(&value.to_le_bytes()[..size]);
    }
}

pub trait TtcBufMut: BufMut {
    fn put_ttc_uint(&mut self, value: u64, size: u8, big_endian: bool, compress: bool) {
        if size == 1 {
            self.put_u8(value as u8);
        }
        else if compress {
            put_compressed(self, truncate_to_size(value, size), false);
        }
        else {
            put_fixed(self, value, size, big_endian);
        }
    }

    fn put_ttc_int(&mut self, value: i64, size: u8, big_endian: bool, compress: bool) {
        if compress {
            put_compressed(self, truncate_to_size(value.unsigned_abs(), size), value < 0);
        }
        else if size == 1 {
            self.put_u8(value as u8);
        }
        else {
            put_fixed(self, value as u64, size, big_endian);
        }
    }

    fn put_clr(&mut self, data: &[u8]) {
        if data.is_empty() {
            self.put_u8(0);
        }
        else if data.len() <= CLR_MAX_SHORT {
            self.put_u8(data.len().prechecked_cast());
            self.put_slice(data);
        }
        else {
            self.put_u8(CLR_CHUNKED);
            for chunk in data.chunks(CLR_MAX_SHORT) {
                self.put_u8(chunk.len().prechecked_cast());
                self.put_slice(chunk);
            }
            self.put_u8(0);
        }
    }

    /// Total length as a compressed 4-byte integer, then the CLR. An empty run is a single `0`.
    fn put_dlc(&mut self, data: &[u8]) {
        if data.is_empty() {
            self.put_u8(0);
        }
        else {
            self.put_ttc_uint(data.len() as u64, 4, true, true);
            self.put_clr(data);
        }
    }

    fn put_key_val(&mut self, key: &[u8], val: &[u8], num: u8) {
        self.put_dlc(key);
        self.put_dlc(val);
        self.put_ttc_int(num.into(), 4, true, true);
    }
}

impl <T: BufMut + ?Sized> TtcBufMut for T {}
