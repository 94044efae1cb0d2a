use zparcel_device::{ByteDevice, ByteDeviceExt};

use crate::error::{ParcelError, Result};

pub const MAGIC: &[u8; 4] = b"free";

/// Fixed size of the on-disk free node record.
pub const FREE_NODE_SIZE: u64 = 24;

/// Header of one free extent; `size` covers the header itself.
#[derive(Debug, Clone)]
pub struct FreeNode {
    pub next: u64,
    pub size: u64,
}

impl FreeNode {
    pub fn read(dev: &mut dyn ByteDevice, offset: u64) -> Result<Self> {
        dev.seek(offset).map_err(ParcelError::Seek)?;
        let mut buf = [0u8; FREE_NODE_SIZE as usize];
        dev.read_exact(&mut buf)
            .map_err(|e| ParcelError::Read(e.to_string()))?;

        if &buf[0..4] != MAGIC {
            return Err(ParcelError::Magic);
        }
        let next = u64::from_be_bytes(buf[4..12].try_into().unwrap());
        let size = u64::from_be_bytes(buf[12..20].try_into().unwrap());
        let stored_crc = u32::from_be_bytes(buf[20..24].try_into().unwrap());

        buf[20..24].copy_from_slice(&[0u8; 4]);
        let computed = crc32c::crc32c(&buf);
        if computed != stored_crc {
            return Err(ParcelError::Crc);
        }

        Ok(Self { next, size })
    }

    pub fn write(&self, dev: &mut dyn ByteDevice, offset: u64) -> Result<()> {
        let mut buf = [0u8; FREE_NODE_SIZE as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..12].copy_from_slice(&self.next.to_be_bytes());
        buf[12..20].copy_from_slice(&self.size.to_be_bytes());

        let crc = crc32c::crc32c(&buf);
        buf[20..24].copy_from_slice(&crc.to_be_bytes());

        dev.seek(offset).map_err(ParcelError::Seek)?;
        dev.write_all(&buf)
            .map_err(|e| ParcelError::Write(e.to_string()))?;
        Ok(())
    }
}
