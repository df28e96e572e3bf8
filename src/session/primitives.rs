use async_trait::async_trait;
use tracing::trace;
use crate::codec::reader::DecodeResult;
use crate::codec::{DecodeError, TtcBufMut, TtcReader};
use crate::error::TnsError;
use crate::session::Session;
use crate::summary::Summary;

/// A composite value that knows how to put itself into a session's outbound buffer and how to
///  get itself from the inbound stream. Higher layers (login, bind values, object types)
///  implement this so they can be nested in each other's messages.
#[async_trait]
pub trait Data: Send + Sync {
    async fn write(&self, session: &mut Session) -> anyhow::Result<()>;

    async fn read(&mut self, session: &mut Session) -> anyhow::Result<()>;
}

impl Session {
    pub fn put_bytes(&mut self, data: &[u8]) {
        self.out_buffer.extend_from_slice(data);
    }

    pub fn put_uint(&mut self, number: u64, size: u8, big_endian: bool, compress: bool) {
        self.out_buffer.put_ttc_uint(number, size, big_endian, compress);
    }

    pub fn put_int(&mut self, number: i64, size: u8, big_endian: bool, compress: bool) {
        self.out_buffer.put_ttc_int(number, size, big_endian, compress);
    }

    pub fn put_clr(&mut self, data: &[u8]) {
        self.out_buffer.put_clr(data);
    }

    pub fn put_key_val(&mut self, key: &[u8], val: &[u8], num: u8) {
        self.out_buffer.put_key_val(key, val, num);
    }

    pub fn put_key_val_string(&mut self, key: &str, val: &str, num: u8) {
        self.put_key_val(key.as_bytes(), val.as_bytes(), num);
    }

    pub async fn put_data(&mut self, data: &dyn Data) -> anyhow::Result<()> {
        data.write(self).await
    }

    /// Decodes a value at the read position, pulling Data packets until the value is complete.
    ///  The position only moves when decoding succeeds.
    async fn pull<T>(&mut self, mut decode: impl FnMut(&mut TtcReader) -> DecodeResult<T>) -> anyhow::Result<T> {
        loop {
            {
                let mut reader = TtcReader::new(&self.in_buffer, self.index);
                match decode(&mut reader) {
                    Ok(value) => {
                        self.index = reader.position();
                        return Ok(value);
                    }
                    Err(DecodeError::NeedMore) => {}
                    Err(DecodeError::Invalid(msg)) => return Err(TnsError::Protocol(msg).into()),
                }
            }
            trace!(buffered = self.in_buffer.len(), index = self.index, "value continues in the next packet");
            self.receive().await?;
        }
    }

    pub async fn get_byte(&mut self) -> anyhow::Result<u8> {
        self.pull(|r| r.read_byte()).await
    }

    /// A 32-bit field, signed or unsigned
    pub async fn get_int(&mut self, size: u8, compress: bool, big_endian: bool) -> anyhow::Result<i64> {
        self.pull(|r| r.read_int(size, compress, big_endian)).await
    }

    pub async fn get_int64(&mut self, size: u8, compress: bool, big_endian: bool) -> anyhow::Result<i64> {
        self.pull(|r| r.read_int64(size, compress, big_endian)).await
    }

    pub async fn get_bytes(&mut self, n: usize) -> anyhow::Result<Vec<u8>> {
        self.pull(|r| r.read_bytes(n)).await
    }

    /// The next `n` bytes without consuming them
    pub async fn peek(&mut self, n: usize) -> anyhow::Result<Vec<u8>> {
        self.pull(|r| r.peek(n).map(<[u8]>::to_vec)).await
    }

    pub async fn get_clr(&mut self) -> anyhow::Result<Vec<u8>> {
        self.pull(|r| r.read_clr()).await
    }

    pub async fn get_dlc(&mut self) -> anyhow::Result<Vec<u8>> {
        self.pull(|r| r.read_dlc()).await
    }

    pub async fn get_key_val(&mut self) -> anyhow::Result<(Vec<u8>, Vec<u8>, i64)> {
        self.pull(|r| r.read_key_val()).await
    }

    pub async fn get_null_term_string(&mut self, max: usize) -> anyhow::Result<String> {
        self.pull(|r| r.read_null_term_string(max)).await
    }

    /// Decodes a [Summary] (without its leading message code) and makes it the session's
    ///  current summary
    pub async fn read_summary(&mut self) -> anyhow::Result<Summary> {
        let (has_eos, has_fsap) = (self.has_eos_capability, self.has_fsap_capability);
        let summary = self.pull(|r| Summary::decode(r, has_eos, has_fsap)).await?;
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    pub async fn get_data(&mut self, data: &mut dyn Data) -> anyhow::Result<()> {
        data.read(self).await
    }
}
