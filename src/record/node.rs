use uuid::Uuid;
use zparcel_device::{ByteDevice, ByteDeviceExt};

use crate::error::{ParcelError, Result};
use crate::types::ObjectType;

pub const MAGIC: &[u8; 4] = b"TREE";

/// Fixed size of the on-disk tree node record.
pub const NODE_SIZE: u64 = 58;

/// One stored (or tombstoned) object's tree record.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub uuid: Uuid,
    pub lnode: u64,
    pub rnode: u64,
    pub object_type: ObjectType,
    pub extra: u8,
    pub inline_payload: [u8; 16],
}

impl TreeNode {
    pub fn read(dev: &mut dyn ByteDevice, offset: u64) -> Result<Self> {
        dev.seek(offset).map_err(ParcelError::Seek)?;
        let mut buf = [0u8; NODE_SIZE as usize];
        dev.read_exact(&mut buf)
            .map_err(|e| ParcelError::Read(e.to_string()))?;

        if &buf[0..4] != MAGIC {
            return Err(ParcelError::Magic);
        }
        let uuid = Uuid::from_slice(&buf[4..20]).map_err(|_| ParcelError::Trunc)?;
        let lnode = u64::from_be_bytes(buf[20..28].try_into().unwrap());
        let rnode = u64::from_be_bytes(buf[28..36].try_into().unwrap());
        let object_type = ObjectType::try_from(buf[36]).map_err(|_| ParcelError::Tree)?;
        let extra = buf[37];
        let stored_crc = u32::from_be_bytes(buf[38..42].try_into().unwrap());

        buf[38..42].copy_from_slice(&[0u8; 4]);
        let computed = crc32c::crc32c(&buf);
        if computed != stored_crc {
            return Err(ParcelError::Crc);
        }

        let mut inline_payload = [0u8; 16];
        inline_payload.copy_from_slice(&buf[42..58]);

        Ok(Self {
            uuid,
            lnode,
            rnode,
            object_type,
            extra,
            inline_payload,
        })
    }

    pub fn write(&self, dev: &mut dyn ByteDevice, offset: u64) -> Result<()> {
        let mut buf = [0u8; NODE_SIZE as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..20].copy_from_slice(self.uuid.as_bytes());
        buf[20..28].copy_from_slice(&self.lnode.to_be_bytes());
        buf[28..36].copy_from_slice(&self.rnode.to_be_bytes());
        buf[36] = self.object_type.into();
        buf[37] = self.extra;
        buf[42..58].copy_from_slice(&self.inline_payload);

        let crc = crc32c::crc32c(&buf);
        buf[38..42].copy_from_slice(&crc.to_be_bytes());

        dev.seek(offset).map_err(ParcelError::Seek)?;
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
        let node = TreeNode {
            uuid: Uuid::from_u128(1),
            lnode: crate::record::SENTINEL,
            rnode: crate::record::SENTINEL,
            object_type: ObjectType::Uint,
            extra: 0,
            inline_payload: {
                let mut p = [0u8; 16];
                p[0..8].copy_from_slice(&42u64.to_be_bytes());
                p
            },
        };
        node.write(&mut dev, 0).unwrap();
        let read_back = TreeNode::read(&mut dev, 0).unwrap();
        assert_eq!(read_back.uuid, Uuid::from_u128(1));
        assert_eq!(u64::from_be_bytes(read_back.inline_payload[0..8].try_into().unwrap()), 42);
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let mut dev = MemoryDevice::new();
        let node = TreeNode {
            uuid: Uuid::from_u128(2),
            lnode: crate::record::SENTINEL,
            rnode: crate::record::SENTINEL,
            object_type: ObjectType::Null,
            extra: 0,
            inline_payload: [0u8; 16],
        };
        node.write(&mut dev, 0).unwrap();
        // flip a byte in the uuid field, outside the crc field
        let mut bytes = dev.into_vec();
        bytes[4] ^= 0xff;
        let mut dev = MemoryDevice::new();
        dev.write_all(&bytes).unwrap();
        dev.seek(0).unwrap();
        assert!(matches!(TreeNode::read(&mut dev, 0), Err(ParcelError::Crc)));
    }
}
