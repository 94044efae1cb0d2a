use uuid::Uuid;
use zparcel_device::{ByteDevice, ByteDeviceExt};

use crate::error::{ParcelError, Result};

pub const MAGIC: &[u8; 7] = b"ZPARCEL";
pub const VERSION: u8 = 1;
pub const FLAG_TAIL_EXTEND: u32 = 1 << 0;

/// Fixed size of the on-disk superblock record.
pub const SUPERBLOCK_SIZE: u64 = 64;

/// File-header superblock, one per parcel, always at offset 0.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub version: u8,
    pub flags: u32,
    pub tree_head: u64,
    pub free_head: u64,
    pub free_tail: u64,
    pub tail_ptr: u64,
    pub root_uuid: Uuid,
}

impl Superblock {
    pub fn tail_extend_allowed(&self) -> bool {
        self.flags & FLAG_TAIL_EXTEND != 0
    }

    pub fn read(dev: &mut dyn ByteDevice) -> Result<Self> {
        dev.seek(0).map_err(ParcelError::Seek)?;
        let mut buf = [0u8; SUPERBLOCK_SIZE as usize];
        dev.read_exact(&mut buf)
            .map_err(|e| ParcelError::Read(e.to_string()))?;

        if &buf[0..7] != MAGIC {
            return Err(ParcelError::Signature);
        }
        let version = buf[7];
        if version != VERSION {
            return Err(ParcelError::Version(version));
        }
        let flags = u32::from_be_bytes(buf[8..12].try_into().unwrap());
        let tree_head = u64::from_be_bytes(buf[12..20].try_into().unwrap());
        let free_head = u64::from_be_bytes(buf[20..28].try_into().unwrap());
        let free_tail = u64::from_be_bytes(buf[28..36].try_into().unwrap());
        let tail_ptr = u64::from_be_bytes(buf[36..44].try_into().unwrap());
        let root_uuid = Uuid::from_slice(&buf[44..60]).map_err(|_| ParcelError::Trunc)?;
        let stored_crc = u32::from_be_bytes(buf[60..64].try_into().unwrap());

        buf[60..64].copy_from_slice(&[0u8; 4]);
        let computed = crc32c::crc32c(&buf);
        if computed != stored_crc {
            return Err(ParcelError::Crc);
        }

        Ok(Self {
            version,
            flags,
            tree_head,
            free_head,
            free_tail,
            tail_ptr,
            root_uuid,
        })
    }

    pub fn write(&self, dev: &mut dyn ByteDevice) -> Result<()> {
        let mut buf = [0u8; SUPERBLOCK_SIZE as usize];
        buf[0..7].copy_from_slice(MAGIC);
        buf[7] = self.version;
        buf[8..12].copy_from_slice(&self.flags.to_be_bytes());
        buf[12..20].copy_from_slice(&self.tree_head.to_be_bytes());
        buf[20..28].copy_from_slice(&self.free_head.to_be_bytes());
        buf[28..36].copy_from_slice(&self.free_tail.to_be_bytes());
        buf[36..44].copy_from_slice(&self.tail_ptr.to_be_bytes());
        buf[44..60].copy_from_slice(self.root_uuid.as_bytes());
        // crc field stays zeroed for the computation below

        let crc = crc32c::crc32c(&buf);
        buf[60..64].copy_from_slice(&crc.to_be_bytes());

        dev.seek(0).map_err(ParcelError::Seek)?;
        dev.write_all(&buf)
            .map_err(|e| ParcelError::Write(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zparcel_device::MemoryDevice;

    #[test]
    fn roundtrip() {
        let mut dev = MemoryDevice::new();
        let sb = Superblock {
            version: VERSION,
            flags: FLAG_TAIL_EXTEND,
            tree_head: crate::record::SENTINEL,
            free_head: SUPERBLOCK_SIZE,
            free_tail: SUPERBLOCK_SIZE,
            tail_ptr: 4096,
            root_uuid: Uuid::nil(),
        };
        sb.write(&mut dev).unwrap();
        let read_back = Superblock::read(&mut dev).unwrap();
        assert_eq!(read_back.tree_head, crate::record::SENTINEL);
        assert_eq!(read_back.tail_ptr, 4096);
        assert!(read_back.tail_extend_allowed());
    }

    #[test]
    fn bad_signature_rejected() {
        let mut dev = MemoryDevice::new();
        dev.write_all(&[0u8; SUPERBLOCK_SIZE as usize]).unwrap();
        dev.seek(0).unwrap();
        assert!(matches!(Superblock::read(&mut dev), Err(ParcelError::Signature)));
    }
}
