use bytes::{Buf, BufMut};
use crate::packet::{PacketHeader, PacketType, TnsPacket, HEADER_LEN};
use crate::util::safe_converter::SafeCast;

/// Terminal answer to a Connect. Body layout:
///
/// ```ascii
///  8: user reason (u8)
///  9: system reason (u8)
/// 10: message length (u16)
/// 12: message
/// ```
///
/// Servers sometimes send less message text than the length field announces. That is not a
///  framing error, the message is whatever arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefusePacket {
    pub flag: u8,
    pub user_reason: u8,
    pub system_reason: u8,
    pub message: String,
}

impl RefusePacket {
    pub const DATA_OFFSET: u16 = 12;

    /// TNS:connection refused
    pub const DEFAULT_ERROR_CODE: u32 = 12564;

    /// The Oracle error code embedded in the message, e.g. `(ERR=12514)`, or in an error stack
    ///  like `(ERROR=(CODE=12514)(EMFI=4))`
    pub fn error_code(&self) -> u32 {
        let upper = self.message.to_ascii_uppercase();
        find_err_code(&upper)
            .or_else(|| find_error_stack_code(&upper))
            .unwrap_or(Self::DEFAULT_ERROR_CODE)
    }
}

/// `(` ws* `ERR` ws* `=` ws* digits ws* `)`
fn find_err_code(msg: &str) -> Option<u32> {
    msg.match_indices('(')
        .find_map(|(pos, _)| {
            let rest = msg[pos + 1..].trim_start().strip_prefix("ERR")?;
            let rest = rest.trim_start().strip_prefix('=')?.trim_start();
            let (code, rest) = split_digits(rest)?;
            rest.trim_start().starts_with(')').then_some(code)
        })
}

/// `(ERROR=` ... `CODE` ws* `=` ws* digits
fn find_error_stack_code(msg: &str) -> Option<u32> {
    let start = msg.find("(ERROR=")?;
    let stack = &msg[start..];
    stack.match_indices("CODE")
        .find_map(|(pos, key)| {
            let rest = stack[pos + key.len()..].trim_start().strip_prefix('=')?.trim_start();
            split_digits(rest).map(|(code, _)| code)
        })
}

fn split_digits(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let code = s[..end].parse().ok()?;
    Some((code, &s[end..]))
}

impl TnsPacket for RefusePacket {
    const PACKET_TYPE: PacketType = PacketType::Refuse;

    fn ser(&self, buf: &mut impl BufMut) {
        let message_len = self.message.len().min(usize::from(u16::MAX - Self::DATA_OFFSET)) as u16;

        PacketHeader {
            length: Self::DATA_OFFSET + message_len,
            packet_type: PacketType::Refuse,
            flag: self.flag,
        }.ser(buf);

        buf.put_u8(self.user_reason);
        buf.put_u8(self.system_reason);
        buf.put_u16(message_len);
        buf.put_slice(&self.message.as_bytes()[..usize::from(message_len)]);
    }

    fn deser(raw: &[u8]) -> anyhow::Result<RefusePacket> {
        let header = PacketHeader::expect(raw, PacketType::Refuse, Self::DATA_OFFSET.safe_cast())?;

        let mut buf = &raw[HEADER_LEN..];
        let user_reason = buf.try_get_u8()?;
        let system_reason = buf.try_get_u8()?;
        let message_len: usize = buf.try_get_u16()?.safe_cast();

        let message_len = message_len.min(buf.len());
        let message = String::from_utf8_lossy(&buf[..message_len]).into_owned();

        Ok(RefusePacket {
            flag: header.flag,
            user_reason,
            system_reason,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_round_trip() {
        let packet = RefusePacket {
            flag: 0,
            user_reason: 34,
            system_reason: 0,
            message: "(DESCRIPTION=(TMP=)(VSNNUM=0)(ERR=12514)(ERROR_STACK=(ERROR=(CODE=12514)(EMFI=4))))".to_string(),
        };
        let raw = packet.to_bytes();
        assert_eq!(raw[8], 34);
        assert_eq!(raw[9], 0);
        assert_eq!(usize::from(u16::from_be_bytes([raw[10], raw[11]])), packet.message.len());

        let parsed = RefusePacket::deser(&raw).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.to_bytes(), raw);
    }

    #[test]
    fn test_truncated_message() {
        let mut raw = vec![0, 17, 0, 0, 4, 0, 0, 0, 1, 2, 0, 100];
        raw.extend_from_slice(b"(ERR=");

        let parsed = RefusePacket::deser(&raw).unwrap();
        assert_eq!(parsed.user_reason, 1);
        assert_eq!(parsed.system_reason, 2);
        assert_eq!(parsed.message, "(ERR=");
        assert_eq!(parsed.error_code(), RefusePacket::DEFAULT_ERROR_CODE);
    }

    #[test]
    fn test_too_short() {
        assert!(RefusePacket::deser(&[0, 10, 0, 0, 4, 0, 0, 0, 1, 2]).is_err());
    }

    #[rstest]
    #[case::err_value("(DESCRIPTION=(TMP=)(VSNNUM=0)(ERR=12514)(ERROR_STACK=(ERROR=(CODE=12505)(EMFI=4))))", 12514)]
    #[case::err_value_with_spaces("( err = 12505 )", 12505)]
    #[case::error_stack_only("(ERROR_STACK=(ERROR=(CODE = 12516)(EMFI=4)))", 12516)]
    #[case::none("listener could not find available handler", 12564)]
    #[case::empty("", 12564)]
    fn test_error_code(#[case] message: &str, #[case] expected: u32) {
        let packet = RefusePacket { flag: 0, user_reason: 0, system_reason: 0, message: message.to_string() };
        assert_eq!(packet.error_code(), expected);
    }
}
