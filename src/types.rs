use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Object type tag, stored as a single byte in the tree node. Tag values are
/// part of the on-disk format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ObjectType {
    Null = 0,
    Bool = 1,
    Uint = 2,
    Sint = 3,
    Float = 4,
    Uuid = 5,
    Blob = 6,
    String = 7,
    List = 8,
    File = 9,
}

impl ObjectType {
    /// Tag >= Blob carries its payload in an external extent.
    pub fn is_external(self) -> bool {
        (self as u8) >= (ObjectType::Blob as u8)
    }
}
