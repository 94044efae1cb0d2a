//! Unbalanced binary search tree of tree-node records, keyed by UUID.

use uuid::Uuid;
use zparcel_device::ByteDevice;

use crate::error::{ParcelError, Result};
use crate::record::header::Superblock;
use crate::record::node::TreeNode;
use crate::record::SENTINEL;
use crate::types::ObjectType;

const MAX_DEPTH: u32 = 128;

/// Result of a successful tree walk to an existing UUID.
pub struct Located {
    pub offset: u64,
    pub parent: Option<u64>,
    pub node: TreeNode,
}

fn cmp(a: &Uuid, b: &Uuid) -> std::cmp::Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

/// Insert a freshly-written tree node (already on disk at `node_offset`) into
/// the tree. Fails `Exists` if the UUID is already present, live or
/// tombstoned.
pub fn insert(dev: &mut dyn ByteDevice, sb: &mut Superblock, uuid: &Uuid, node_offset: u64) -> Result<()> {
    if sb.tree_head == SENTINEL {
        sb.tree_head = node_offset;
        return Ok(());
    }

    let mut cur = sb.tree_head;
    let mut depth = 0u32;
    loop {
        if depth >= MAX_DEPTH {
            return Err(ParcelError::MaxDepth);
        }
        depth += 1;

        let mut node = TreeNode::read(dev, cur)?;
        match cmp(uuid, &node.uuid) {
            std::cmp::Ordering::Equal => return Err(ParcelError::Exists),
            std::cmp::Ordering::Less => {
                if node.lnode == SENTINEL {
                    node.lnode = node_offset;
                    node.write(dev, cur)?;
                    return Ok(());
                }
                cur = node.lnode;
            }
            std::cmp::Ordering::Greater => {
                if node.rnode == SENTINEL {
                    node.rnode = node_offset;
                    node.write(dev, cur)?;
                    return Ok(());
                }
                cur = node.rnode;
            }
        }
    }
}

/// Point lookup. Returns `NoExist` if the UUID is not in the tree at all
/// (tombstoned entries ARE returned — callers check `object_type`).
pub fn lookup(dev: &mut dyn ByteDevice, sb: &Superblock, uuid: &Uuid) -> Result<Located> {
    let mut parent = None;
    let mut cur = sb.tree_head;
    let mut depth = 0u32;
    while cur != SENTINEL {
        if depth >= MAX_DEPTH {
            return Err(ParcelError::MaxDepth);
        }
        depth += 1;

        let node = TreeNode::read(dev, cur)?;
        match cmp(uuid, &node.uuid) {
            std::cmp::Ordering::Equal => {
                return Ok(Located {
                    offset: cur,
                    parent,
                    node,
                })
            }
            std::cmp::Ordering::Less => {
                parent = Some(cur);
                cur = node.lnode;
            }
            std::cmp::Ordering::Greater => {
                parent = Some(cur);
                cur = node.rnode;
            }
        }
    }
    Err(ParcelError::NoExist)
}

/// Retype a live node to `Null`, tombstoning it. The UUID slot and tree
/// shape are left in place; the caller is responsible for freeing any
/// external extent the node pointed at.
pub fn tombstone(dev: &mut dyn ByteDevice, offset: u64, node: &mut TreeNode) -> Result<()> {
    node.object_type = ObjectType::Null;
    node.inline_payload = [0u8; 16];
    node.write(dev, offset)
}

/// Pre-order walk from `treehead`, yielding `(uuid, type, depth)` for every
/// node including tombstones.
pub fn preorder(dev: &mut dyn ByteDevice, sb: &Superblock) -> Result<Vec<(Uuid, ObjectType, u32)>> {
    let mut out = Vec::new();
    walk(dev, sb.tree_head, 0, &mut out)?;
    Ok(out)
}

fn walk(dev: &mut dyn ByteDevice, offset: u64, depth: u32, out: &mut Vec<(Uuid, ObjectType, u32)>) -> Result<()> {
    if offset == SENTINEL {
        return Ok(());
    }
    if depth >= MAX_DEPTH {
        return Err(ParcelError::MaxDepth);
    }
    let node = TreeNode::read(dev, offset)?;
    out.push((node.uuid, node.object_type, depth));
    walk(dev, node.lnode, depth + 1, out)?;
    walk(dev, node.rnode, depth + 1, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zparcel_device::MemoryDevice;

    fn fresh_sb() -> Superblock {
        Superblock {
            version: crate::record::header::VERSION,
            flags: crate::record::header::FLAG_TAIL_EXTEND,
            tree_head: SENTINEL,
            free_head: SENTINEL,
            free_tail: SENTINEL,
            tail_ptr: 64,
            root_uuid: Uuid::nil(),
        }
    }

    fn plant(dev: &mut MemoryDevice, offset: u64, uuid: Uuid) {
        let node = TreeNode {
            uuid,
            lnode: SENTINEL,
            rnode: SENTINEL,
            object_type: ObjectType::Uint,
            extra: 0,
            inline_payload: [0u8; 16],
        };
        node.write(dev, offset).unwrap();
    }

    #[test]
    fn insert_and_lookup() {
        let mut dev = MemoryDevice::new();
        let mut sb = fresh_sb();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        plant(&mut dev, 0, a);
        insert(&mut dev, &mut sb, &a, 0).unwrap();
        plant(&mut dev, 100, b);
        insert(&mut dev, &mut sb, &b, 100).unwrap();

        assert_eq!(sb.tree_head, 0);
        let located = lookup(&mut dev, &sb, &b).unwrap();
        assert_eq!(located.offset, 100);
    }

    #[test]
    fn duplicate_insert_fails_exists() {
        let mut dev = MemoryDevice::new();
        let mut sb = fresh_sb();
        let a = Uuid::from_u128(1);
        plant(&mut dev, 0, a);
        insert(&mut dev, &mut sb, &a, 0).unwrap();
        plant(&mut dev, 200, a);
        assert!(matches!(insert(&mut dev, &mut sb, &a, 200), Err(ParcelError::Exists)));
    }

    #[test]
    fn lookup_missing_fails_noexist() {
        let mut dev = MemoryDevice::new();
        let sb = fresh_sb();
        assert!(matches!(lookup(&mut dev, &sb, &Uuid::from_u128(9)), Err(ParcelError::NoExist)));
    }
}
