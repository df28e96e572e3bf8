use crate::config::{ConnectionOption, SEGMENT_RESERVE};
use crate::error::TnsError;
use crate::packet::AcceptPacket;

/// The contract negotiated during the handshake. Before the handshake it holds what the client
///  requests, after an Accept it holds what the server granted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub version: u16,
    pub lo_version: u16,
    pub options: u16,
    pub negotiated_options: u16,
    pub our_one: u16,
    pub histone: u16,
    pub reconnect_addr: Option<String>,
    pub acfl0: u8,
    pub acfl1: u8,
    pub session_data_unit: u16,
    pub transport_data_unit: u16,
    pub using_async_receivers: bool,
    pub is_nt_connected: bool,
    pub on_break_reset: bool,
    pub got_reset: bool,
}

impl SessionContext {
    pub const VERSION: u16 = 312;
    pub const LO_VERSION: u16 = 300;
    pub const OPTIONS: u16 = 1 | 1024 | 2048;

    pub fn new(option: &ConnectionOption) -> SessionContext {
        SessionContext {
            version: Self::VERSION,
            lo_version: Self::LO_VERSION,
            options: Self::OPTIONS,
            negotiated_options: 0,
            our_one: 1,
            histone: 0,
            reconnect_addr: None,
            acfl0: 0,
            acfl1: 0,
            session_data_unit: option.session_data_unit_size,
            transport_data_unit: option.transport_data_unit_size,
            using_async_receivers: false,
            is_nt_connected: false,
            on_break_reset: false,
            got_reset: false,
        }
    }

    /// Replaces the requested parameters with the server's grant. An SDU bigger than the TDU is
    ///  clamped to the TDU.
    pub fn from_accept(accept: &AcceptPacket) -> anyhow::Result<SessionContext> {
        let session_data_unit = accept.session_data_unit.min(accept.transport_data_unit);
        if session_data_unit <= SEGMENT_RESERVE {
            return Err(TnsError::HandshakeFailed(format!("server granted a session data unit of {} bytes", session_data_unit)).into());
        }

        Ok(SessionContext {
            version: accept.version,
            lo_version: 0,
            options: 0,
            negotiated_options: accept.negotiated_options,
            our_one: 0,
            histone: accept.histone,
            reconnect_addr: accept.reconnect_addr(),
            acfl0: accept.acfl0,
            acfl1: accept.acfl1,
            session_data_unit,
            transport_data_unit: accept.transport_data_unit,
            using_async_receivers: false,
            is_nt_connected: false,
            on_break_reset: false,
            got_reset: false,
        })
    }

    /// Maximum payload per outbound Data packet
    pub fn max_segment_len(&self) -> usize {
        usize::from(self.session_data_unit.saturating_sub(SEGMENT_RESERVE)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new() {
        let mut option = ConnectionOption::new("db", 1521, "ORCL");
        option.session_data_unit_size = 8192;
        option.transport_data_unit_size = 32767;

        let ctx = SessionContext::new(&option);
        assert_eq!(ctx.version, 312);
        assert_eq!(ctx.lo_version, 300);
        assert_eq!(ctx.options, 3073);
        assert_eq!(ctx.our_one, 1);
        assert_eq!(ctx.session_data_unit, 8192);
        assert_eq!(ctx.transport_data_unit, 32767);
        assert_eq!(ctx.max_segment_len(), 8172);
    }

    #[rstest]
    #[case::as_granted(8192, 32767, 8192)]
    #[case::clamped(8192, 2048, 2048)]
    fn test_from_accept(#[case] sdu: u16, #[case] tdu: u16, #[case] expected_sdu: u16) {
        let mut accept = AcceptPacket::new(310, 0x41, sdu, tdu);
        accept.acfl0 = 1;

        let ctx = SessionContext::from_accept(&accept).unwrap();
        assert_eq!(ctx.version, 310);
        assert_eq!(ctx.negotiated_options, 0x41);
        assert_eq!(ctx.session_data_unit, expected_sdu);
        assert_eq!(ctx.transport_data_unit, tdu);
        assert_eq!(ctx.acfl0, 1);
        assert_eq!(ctx.reconnect_addr, None);
    }

    #[test]
    fn test_from_accept_tiny_sdu() {
        let accept = AcceptPacket::new(312, 0, 20, 8192);
        assert!(SessionContext::from_accept(&accept).is_err());
    }
}
