/// Widening casts that are lossless on every supported platform
pub trait SafeCast<T> {
    fn safe_cast(self) -> T;
}

#[cfg(not(target_pointer_width = "16"))]
impl SafeCast<usize> for u16 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}

#[cfg(not(target_pointer_width = "16"))]
impl SafeCast<usize> for u8 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}


/// For narrowing casts where the wire layout ensures that the value is in the narrower type's
///  range, e.g. the length of a CLR chunk that was cut to at most 64 bytes.
/// NB: The implementations will panic otherwise
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}
impl PrecheckedCast<u8> for usize {
    fn prechecked_cast(self) -> u8 {
        self.try_into().expect("this is a bug: application logic should have ensured the value range")
    }
}

/// Converts a length to a 16-bit wire length field, failing instead of truncating
pub fn wire_len(len: usize) -> anyhow::Result<u16> {
    u16::try_from(len)
        .map_err(|_| anyhow::anyhow!("length {} does not fit into a 16-bit length field", len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_len() {
        assert_eq!(wire_len(0).unwrap(), 0);
        assert_eq!(wire_len(65535).unwrap(), 65535);
        assert!(wire_len(65536).is_err());
    }

    #[test]
    #[should_panic]
    fn test_prechecked_cast_out_of_range() {
        let _: u8 = 256usize.prechecked_cast();
    }
}
