use common::{DataType, DbError, DbResult, OpCode, ACTION_LEN};

/// A logged primitive: an opcode, a destination (a packed page id or an
/// absolute byte offset, depending on `op`), and the type/length of the
/// value that follows it on the log. `dest` always encodes a true
/// absolute byte offset for mutating ops here (page_id * PAGE_SIZE +
/// in-page cursor) so that generic replay via `dest % PAGE_SIZE` is
/// correct for every op this engine logs, including B+tree/FSM-internal
/// ones — the source's `dest=leaf.Id` shortcut for index ops is not
/// reproduced (see DESIGN.md).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub op: OpCode,
    pub dest: u64,
    pub v_type: DataType,
    pub v_len: u16,
}

impl Action {
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= ACTION_LEN);
        buf[0] = self.op as u8;
        buf[1..9].copy_from_slice(&self.dest.to_le_bytes());
        buf[9] = self.v_type as u8;
        buf[10..12].copy_from_slice(&self.v_len.to_le_bytes());
        buf[12] = 0; // reserved
    }

    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < ACTION_LEN {
            return Err(DbError::CorruptLog("action record truncated".into()));
        }
        Ok(Self {
            op: OpCode::try_from(buf[0])?,
            dest: u64::from_le_bytes(buf[1..9].try_into().unwrap()),
            v_type: DataType::try_from(buf[9])?,
            v_len: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
        })
    }
}

/// An `Action` plus the value bytes that trailed it on the log, resolved
/// while reading (whether freshly during forward execution, or while
/// replaying during startup recovery).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAction {
    pub action: Action,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let a = Action {
            op: OpCode::Insert,
            dest: 12345,
            v_type: DataType::String,
            v_len: 7,
        };
        let mut buf = [0u8; ACTION_LEN];
        a.encode(&mut buf);
        let back = Action::decode(&buf).unwrap();
        assert_eq!(a, back);
    }
}
