use crate::action::Action;
use common::{ACTION_LEN, TRX_SIZE};
use common::{DbError, DbResult};
use common::{TXN_BEGIN, TXN_CANCEL, TXN_COMMIT, TXN_PENDING};

/// `[begin:1][trxId:4][action:13][commit:1]`, padded to `TRX_SIZE` (34)
/// bytes. `flag` carries one of `TXN_BEGIN`/`TXN_PENDING`/`TXN_COMMIT`/
/// `TXN_CANCEL`; the remaining padding bytes (including the nominal
/// trailing "commit" byte) are reserved and always zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub flag: u8,
    pub trx_id: i32,
    pub action: Action,
}

const FIXED_LEN: usize = 1 + 4 + ACTION_LEN;

impl LogRecord {
    pub fn encode(&self) -> [u8; TRX_SIZE] {
        let mut buf = [0u8; TRX_SIZE];
        buf[0] = self.flag;
        buf[1..5].copy_from_slice(&self.trx_id.to_le_bytes());
        self.action.encode(&mut buf[5..5 + ACTION_LEN]);
        buf
    }

    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < FIXED_LEN {
            return Err(DbError::CorruptLog("log record shorter than header".into()));
        }
        let flag = buf[0];
        if !matches!(flag, TXN_BEGIN | TXN_PENDING | TXN_COMMIT | TXN_CANCEL) {
            return Err(DbError::CorruptLog(format!("bad begin flag {flag}")));
        }
        let trx_id = i32::from_le_bytes(buf[1..5].try_into().unwrap());
        if trx_id == 0 {
            return Err(DbError::CorruptLog("zero trxId in log record".into()));
        }
        let action = Action::decode(&buf[5..5 + ACTION_LEN])?;
        Ok(Self {
            flag,
            trx_id,
            action,
        })
    }
}
