//! Root pointer and administrative listing.

use uuid::Uuid;
use zparcel_device::ByteDevice;

use crate::error::{ParcelError, Result};
use crate::record::header::Superblock;
use crate::tree;
use crate::types::ObjectType;

/// Sets the root UUID, failing `NoExist` if it doesn't name a live object.
/// Passing the nil UUID clears the root.
pub fn set_root(dev: &mut dyn ByteDevice, sb: &mut Superblock, uuid: Uuid) -> Result<()> {
    if !uuid.is_nil() {
        let located = tree::lookup(dev, sb, &uuid)?;
        if located.node.object_type == ObjectType::Null {
            return Err(ParcelError::NoExist);
        }
    }
    sb.root_uuid = uuid;
    Ok(())
}

pub fn get_root(sb: &Superblock) -> Option<Uuid> {
    if sb.root_uuid.is_nil() {
        None
    } else {
        Some(sb.root_uuid)
    }
}

/// One line of a pre-order listing.
pub struct Entry {
    pub uuid: Uuid,
    pub object_type: ObjectType,
    pub depth: u32,
}

pub fn list(dev: &mut dyn ByteDevice, sb: &Superblock) -> Result<Vec<Entry>> {
    Ok(tree::preorder(dev, sb)?
        .into_iter()
        .map(|(uuid, object_type, depth)| Entry {
            uuid,
            object_type,
            depth,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::node::TreeNode;
    use crate::record::SENTINEL;
    use zparcel_device::MemoryDevice;

    #[test]
    fn root_must_name_live_object() {
        let mut dev = MemoryDevice::new();
        let mut sb = Superblock {
            version: crate::record::header::VERSION,
            flags: 0,
            tree_head: SENTINEL,
            free_head: SENTINEL,
            free_tail: SENTINEL,
            tail_ptr: 64,
            root_uuid: Uuid::nil(),
        };
        let id = Uuid::from_u128(7);
        assert!(matches!(set_root(&mut dev, &mut sb, id), Err(ParcelError::NoExist)));

        let node = TreeNode {
            uuid: id,
            lnode: SENTINEL,
            rnode: SENTINEL,
            object_type: ObjectType::Null,
            extra: 0,
            inline_payload: [0u8; 16],
        };
        node.write(&mut dev, 0).unwrap();
        sb.tree_head = 0;
        assert!(matches!(set_root(&mut dev, &mut sb, id), Err(ParcelError::NoExist)));
    }
}
