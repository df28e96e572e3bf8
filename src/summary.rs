use crate::codec::reader::DecodeResult;
use crate::codec::TtcReader;

/// The server's end-of-call status envelope. It follows message code [Summary::MESSAGE_CODE]
///  and carries the call's return code and, if that is not 0, the error message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub end_of_call_status: i64,
    pub end_to_end_ecid_sequence: i64,
    pub cur_row_number: i64,
    pub ret_code: i64,
    pub array_elm_w_error: i64,
    pub array_elm_errno: i64,
    pub cursor_id: i64,
    pub error_pos: i64,
    pub sql_type: u8,
    pub oer_fatal: u8,
    pub flags: i64,
    pub user_cursor_opt: i64,
    pub upi_param: u8,
    pub warning_flag: u8,
    pub rba: i64,
    pub partition_id: i64,
    pub table_id: u8,
    pub block_number: i64,
    pub slot_number: i64,
    pub os_error: i64,
    pub stmt_number: u8,
    pub call_number: u8,
    pub pad1: i64,
    pub success_iter: i64,
    pub error_message: Vec<u8>,
}

impl Summary {
    pub const MESSAGE_CODE: u8 = 4;

    /// `has_eos` and `has_fsap` are the end-of-call-status and ECID capabilities negotiated by
    ///  the layers above; each adds a leading field.
    pub fn decode(reader: &mut TtcReader, has_eos: bool, has_fsap: bool) -> DecodeResult<Summary> {
        let mut result = Summary::default();
        if has_eos {
            result.end_of_call_status = reader.read_int64(4, true, true)?;
        }
        if has_fsap {
            result.end_to_end_ecid_sequence = reader.read_int64(2, true, true)?;
        }
        result.cur_row_number = reader.read_int64(4, true, true)?;
        result.ret_code = reader.read_int64(2, true, true)?;
        result.array_elm_w_error = reader.read_int64(2, true, true)?;
        result.array_elm_errno = reader.read_int64(2, true, true)?;
        result.cursor_id = reader.read_int64(2, true, true)?;
        result.error_pos = reader.read_int64(2, true, true)?;
        result.sql_type = reader.read_byte()?;
        result.oer_fatal = reader.read_byte()?;
        result.flags = reader.read_int64(2, true, true)?;
        result.user_cursor_opt = reader.read_int64(2, true, true)?;
        result.upi_param = reader.read_byte()?;
        result.warning_flag = reader.read_byte()?;
        result.rba = reader.read_int64(4, true, true)?;
        result.partition_id = reader.read_int64(2, true, true)?;
        result.table_id = reader.read_byte()?;
        result.block_number = reader.read_int64(4, true, true)?;
        result.slot_number = reader.read_int64(2, true, true)?;
        result.os_error = reader.read_int64(4, true, true)?;
        result.stmt_number = reader.read_byte()?;
        result.call_number = reader.read_byte()?;
        result.pad1 = reader.read_int64(2, true, true)?;
        result.success_iter = reader.read_int64(4, true, true)?;
        if result.ret_code != 0 {
            result.error_message = reader.read_clr()?;
        }
        Ok(result)
    }

    #[cfg(test)]
    pub(crate) fn encode(&self, buf: &mut impl bytes::BufMut, has_eos: bool, has_fsap: bool) {
        use crate::codec::TtcBufMut;

        if has_eos {
            buf.put_ttc_int(self.end_of_call_status, 4, true, true);
        }
        if has_fsap {
            buf.put_ttc_int(self.end_to_end_ecid_sequence, 2, true, true);
        }
        buf.put_ttc_int(self.cur_row_number, 4, true, true);
        buf.put_ttc_int(self.ret_code, 2, true, true);
        buf.put_ttc_int(self.array_elm_w_error, 2, true, true);
        buf.put_ttc_int(self.array_elm_errno, 2, true, true);
        buf.put_ttc_int(self.cursor_id, 2, true, true);
        buf.put_ttc_int(self.error_pos, 2, true, true);
        buf.put_u8(self.sql_type);
        buf.put_u8(self.oer_fatal);
        buf.put_ttc_int(self.flags, 2, true, true);
        buf.put_ttc_int(self.user_cursor_opt, 2, true, true);
        buf.put_u8(self.upi_param);
        buf.put_u8(self.warning_flag);
        buf.put_ttc_int(self.rba, 4, true, true);
        buf.put_ttc_int(self.partition_id, 2, true, true);
        buf.put_u8(self.table_id);
        buf.put_ttc_int(self.block_number, 4, true, true);
        buf.put_ttc_int(self.slot_number, 2, true, true);
        buf.put_ttc_int(self.os_error, 4, true, true);
        buf.put_u8(self.stmt_number);
        buf.put_u8(self.call_number);
        buf.put_ttc_int(self.pad1, 2, true, true);
        buf.put_ttc_int(self.success_iter, 4, true, true);
        if self.ret_code != 0 {
            buf.put_clr(&self.error_message);
        }
    }

    #[cfg(test)]
    pub(crate) fn with_error(ret_code: i64, message: &str) -> Summary {
        Summary {
            ret_code,
            error_message: message.as_bytes().to_vec(),
            ..Summary::default()
        }
    }
}
