/// Decodes text that the server sends in the database character set. The session only needs it
///  for error messages; full character set support lives above this layer.
pub trait StringConverter: Send + Sync + 'static {
    fn decode(&self, bytes: &[u8]) -> String;
}

/// Treats everything as UTF-8, replacing invalid sequences
pub struct LossyUtf8;

impl StringConverter for LossyUtf8 {
    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossy_utf8() {
        assert_eq!(LossyUtf8.decode(b"ORA-00942: table or view does not exist"), "ORA-00942: table or view does not exist");
        assert_eq!(LossyUtf8.decode(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }
}
