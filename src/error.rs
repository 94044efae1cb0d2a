use thiserror::Error;

/// Single error taxonomy for the whole engine. The CLI renders this as
/// `FAIL - <reason>` via `Display`.
#[derive(Error, Debug)]
pub enum ParcelError {
    #[error("open: {0}")]
    Open(String),
    #[error("seek failed")]
    Seek(#[from] std::io::Error),
    #[error("read failed: {0}")]
    Read(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("bad signature")]
    Signature,
    #[error("unsupported format version {0}")]
    Version(u8),
    #[error("bad magic")]
    Magic,
    #[error("crc mismatch")]
    Crc,
    #[error("truncated record")]
    Trunc,
    #[error("tree corrupt")]
    Tree,
    #[error("free list corrupt")]
    FreeList,
    #[error("object already exists")]
    Exists,
    #[error("object does not exist")]
    NoExist,
    #[error("no free extent available")]
    NoFree,
    #[error("tree depth exceeded")]
    MaxDepth,
    #[error("parcel is not open")]
    NotOpen,
    #[error("type mismatch")]
    TypeMismatch,
}

pub type Result<T> = std::result::Result<T, ParcelError>;
