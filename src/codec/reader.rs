use thiserror::Error;
use crate::codec::{CLR_CHUNKED, CLR_ERROR, CLR_NULL, COMPRESSED_NEGATIVE};
use crate::util::safe_converter::SafeCast;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The value continues beyond the buffered bytes. The session pulls another packet and
    ///  decodes the value again from its start.
    #[error("not enough bytes buffered")]
    NeedMore,
    #[error("{0}")]
    Invalid(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Cursor over the inbound logical buffer. It never blocks; running out of bytes is reported
///  as [DecodeError::NeedMore] and leaves the caller's committed position untouched.
pub struct TtcReader<'a> {
    buf: &'a [u8],
    index: usize,
}

impl <'a> TtcReader<'a> {
    pub fn new(buf: &'a [u8], index: usize) -> TtcReader<'a> {
        TtcReader { buf, index }
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.index)
    }

    pub fn peek(&self, n: usize) -> DecodeResult<&'a [u8]> {
        self.buf.get(self.index..self.index + n)
            .ok_or(DecodeError::NeedMore)
    }

    pub fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let result = self.peek(n)?;
        self.index += n;
        Ok(result)
    }

    pub fn read_byte(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bytes(&mut self, n: usize) -> DecodeResult<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn read_int64(&mut self, size: u8, compress: bool, big_endian: bool) -> DecodeResult<i64> {
        let mut size = size;
        let mut big_endian = big_endian;
        let mut negative = false;
        if compress {
            size = self.read_byte()?;
            if size & COMPRESSED_NEGATIVE != 0 {
                negative = true;
                size &= !COMPRESSED_NEGATIVE;
            }
            big_endian = true;
        }
        if size == 0 {
            return Ok(0);
        }
        if size > 8 {
            return Err(DecodeError::Invalid(format!("integer length {} is more than 8 bytes", size)));
        }

        let size: usize = size.safe_cast();
        let bytes = self.take(size)?;
        let mut temp = [0u8; 8];
        let value = if big_endian {
            temp[8 - size..].copy_from_slice(bytes);
            u64::from_be_bytes(temp)
        }
        else {
            temp[..size].copy_from_slice(bytes);
            u64::from_le_bytes(temp)
        };

        let value = value as i64;
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    /// A 32-bit wire field. Servers send both signed and unsigned values in these fields, so
    ///  anything from `i32::MIN` to `u32::MAX` is accepted.
    pub fn read_int(&mut self, size: u8, compress: bool, big_endian: bool) -> DecodeResult<i64> {
        let value = self.read_int64(size, compress, big_endian)?;
        if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
            return Err(DecodeError::Invalid(format!("integer {} does not fit into 32 bits", value)));
        }
        Ok(value)
    }

    pub fn read_clr(&mut self) -> DecodeResult<Vec<u8>> {
        let size = self.read_byte()?;
        match size {
            0 | CLR_NULL => Ok(Vec::new()),
            CLR_ERROR => Err(DecodeError::Invalid("TTC error".to_string())),
            CLR_CHUNKED => {
                let mut result = Vec::new();
                loop {
                    let chunk_len = self.read_byte()?;
                    if chunk_len == 0 {
                        break;
                    }
                    result.extend_from_slice(self.take(chunk_len.safe_cast())?);
                }
                Ok(result)
            }
            n => self.read_bytes(n.safe_cast()),
        }
    }

    pub fn read_dlc(&mut self) -> DecodeResult<Vec<u8>> {
        let len = self.read_int64(4, true, true)?;
        if len <= 0 {
            return Ok(Vec::new());
        }
        let mut result = self.read_clr()?;
        if let Ok(len) = usize::try_from(len) {
            result.truncate(len);
        }
        Ok(result)
    }

    pub fn read_key_val(&mut self) -> DecodeResult<(Vec<u8>, Vec<u8>, i64)> {
        let key = self.read_dlc()?;
        let val = self.read_dlc()?;
        let num = self.read_int(4, true, true)?;
        Ok((key, val, num))
    }

    /// Reads a string that ends with a NUL byte within the next `max` bytes. The NUL is consumed.
    ///  Without a NUL, the result is all `max` bytes.
    pub fn read_null_term_string(&mut self, max: usize) -> DecodeResult<String> {
        let available = &self.buf[self.index.min(self.buf.len())..];
        let window = &available[..max.min(available.len())];
        if let Some(pos) = window.iter().position(|&b| b == 0) {
            let result = String::from_utf8_lossy(&window[..pos]).into_owned();
            self.index += pos + 1;
            return Ok(result);
        }
        let bytes = self.take(max)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
