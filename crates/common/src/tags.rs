use crate::DbError;

/// The page-type tag byte. Drives both dispatch (which allocator owns the
/// body) and error messages when a page is read in the wrong context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    None = 0,
    Free = 1,
    VarHeap = 2,
    MultiPage = 3,
    IndexInternal = 4,
    IndexLeaf = 5,
    MetaTable = 6,
    FsmRoot = 7,
    FileFixedRow = 8,
    FileTypeIdx = 9,
    FileTimeIdx = 10,
    FileIdIdx = 11,
    Logger = 12,
}

impl PageType {
    pub fn as_str(self) -> &'static str {
        match self {
            PageType::None => "none",
            PageType::Free => "free",
            PageType::VarHeap => "var-heap",
            PageType::MultiPage => "multi-page",
            PageType::IndexInternal => "index-internal",
            PageType::IndexLeaf => "index-leaf",
            PageType::MetaTable => "meta-table",
            PageType::FsmRoot => "fsm-root",
            PageType::FileFixedRow => "file-fixed-row",
            PageType::FileTypeIdx => "file-type-idx",
            PageType::FileTimeIdx => "file-time-idx",
            PageType::FileIdIdx => "file-id-idx",
            PageType::Logger => "logger",
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for PageType {
    type Error = DbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => PageType::None,
            1 => PageType::Free,
            2 => PageType::VarHeap,
            3 => PageType::MultiPage,
            4 => PageType::IndexInternal,
            5 => PageType::IndexLeaf,
            6 => PageType::MetaTable,
            7 => PageType::FsmRoot,
            8 => PageType::FileFixedRow,
            9 => PageType::FileTypeIdx,
            10 => PageType::FileTimeIdx,
            11 => PageType::FileIdIdx,
            12 => PageType::Logger,
            other => return Err(DbError::InvalidPage(format!("unknown page type tag {other}"))),
        })
    }
}

/// Action opcodes, as logged on the WAL and replayed by the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Insert = 0,
    Delete = 1,
    Update = 2,
    NewPage = 3,
    Snapshot = 4,
    IdxInsert = 5,
    IdxDelete = 6,
    IdxUpdate = 7,
    GetVarSpace = 8,
    PutVarSpace = 9,
    GetFixSpace = 10,
    PutFixSpace = 11,
    Cancel = 12,
    None = 13,
}

impl TryFrom<u8> for OpCode {
    type Error = DbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => OpCode::Insert,
            1 => OpCode::Delete,
            2 => OpCode::Update,
            3 => OpCode::NewPage,
            4 => OpCode::Snapshot,
            5 => OpCode::IdxInsert,
            6 => OpCode::IdxDelete,
            7 => OpCode::IdxUpdate,
            8 => OpCode::GetVarSpace,
            9 => OpCode::PutVarSpace,
            10 => OpCode::GetFixSpace,
            11 => OpCode::PutFixSpace,
            12 => OpCode::Cancel,
            13 => OpCode::None,
            other => return Err(DbError::CorruptLog(format!("unknown opcode {other}"))),
        })
    }
}

/// Value type tag carried by an `Action`, used by the executor to decide
/// whether the payload needs a length/pointer prefix written ahead of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    Int64 = 0,
    Int32 = 1,
    Int16 = 2,
    Int8 = 3,
    Float = 4,
    Bool = 5,
    Time = 6,
    Uuid = 7,
    Hash = 8,
    Nil = 9,
    Page = 10,
    String = 11,
    Blob = 12,
    NlBlob = 13,
    ChainBlob = 14,
}

impl DataType {
    /// Fixed encoded length, for the types that have one. Variable types
    /// (`String`, `Blob`, `NlBlob`, `ChainBlob`) return `None`; their length
    /// travels in the action's `vLen` field instead.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            DataType::Int64 | DataType::Float | DataType::Time | DataType::Page => Some(8),
            DataType::Int32 => Some(4),
            DataType::Int16 => Some(2),
            DataType::Int8 | DataType::Bool => Some(1),
            DataType::Uuid | DataType::Hash => Some(16),
            DataType::Nil => Some(0),
            DataType::String | DataType::Blob | DataType::NlBlob | DataType::ChainBlob => None,
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = DbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => DataType::Int64,
            1 => DataType::Int32,
            2 => DataType::Int16,
            3 => DataType::Int8,
            4 => DataType::Float,
            5 => DataType::Bool,
            6 => DataType::Time,
            7 => DataType::Uuid,
            8 => DataType::Hash,
            9 => DataType::Nil,
            10 => DataType::Page,
            11 => DataType::String,
            12 => DataType::Blob,
            13 => DataType::NlBlob,
            14 => DataType::ChainBlob,
            other => return Err(DbError::CorruptLog(format!("unknown data type {other}"))),
        })
    }
}
