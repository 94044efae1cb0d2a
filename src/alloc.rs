//! Free-space allocator: a singly-linked list of free extents serving
//! first-fit, forward-scan allocation with no coalescing.

use zparcel_device::{ByteDevice, ByteDeviceExt};

use crate::error::{ParcelError, Result};
use crate::record::free::{FreeNode, FREE_NODE_SIZE};
use crate::record::header::Superblock;
use crate::record::SENTINEL;

fn max_scan(sb: &Superblock) -> u64 {
    sb.tail_ptr / FREE_NODE_SIZE + 1
}

/// Allocate at least `requested` bytes. Returns `(offset, granted)`; `granted`
/// may exceed `requested` by at most `FREE_NODE_SIZE - 1` (the caller records
/// the slack so `free` can reclaim the whole extent later). `requested` is
/// floored to `FREE_NODE_SIZE` so every grant is always large enough for
/// `free` to relink it as a free node later.
pub fn alloc(dev: &mut dyn ByteDevice, sb: &mut Superblock, requested: u64) -> Result<(u64, u64)> {
    if requested == 0 {
        return Err(ParcelError::NoFree);
    }
    let requested = requested.max(FREE_NODE_SIZE);

    let mut prev: Option<u64> = None;
    let mut cur = sb.free_head;
    let mut steps = 0u64;
    let limit = max_scan(sb);

    while cur != SENTINEL {
        if steps > limit {
            return Err(ParcelError::FreeList);
        }
        steps += 1;

        let victim = FreeNode::read(dev, cur)?;
        if victim.size >= requested {
            return take_victim(dev, sb, prev, cur, &victim, requested);
        }
        prev = Some(cur);
        cur = victim.next;
    }

    if sb.tail_extend_allowed() {
        let offset = sb.tail_ptr;
        dev.seek(offset).map_err(ParcelError::Seek)?;
        let zeros = vec![0u8; requested as usize];
        dev.write_all(&zeros)
            .map_err(|e| ParcelError::Write(e.to_string()))?;
        sb.tail_ptr += requested;
        Ok((offset, requested))
    } else {
        Err(ParcelError::NoFree)
    }
}

fn take_victim(
    dev: &mut dyn ByteDevice,
    sb: &mut Superblock,
    prev: Option<u64>,
    victim_offset: u64,
    victim: &FreeNode,
    requested: u64,
) -> Result<(u64, u64)> {
    let remainder = victim.size - requested;

    if remainder >= FREE_NODE_SIZE {
        let split_offset = victim_offset + requested;
        let split = FreeNode {
            next: victim.next,
            size: remainder,
        };
        split.write(dev, split_offset)?;
        relink(dev, sb, prev, victim_offset, split_offset)?;
        Ok((victim_offset, requested))
    } else {
        relink(dev, sb, prev, victim_offset, victim.next)?;
        Ok((victim_offset, victim.size))
    }
}

/// Rewires the list around `victim_offset`, replacing it with `replacement`
/// (either a split remainder's offset or the victim's old `next`).
fn relink(
    dev: &mut dyn ByteDevice,
    sb: &mut Superblock,
    prev: Option<u64>,
    victim_offset: u64,
    replacement: u64,
) -> Result<()> {
    match prev {
        None => sb.free_head = replacement,
        Some(prev_offset) => {
            let mut prev_node = FreeNode::read(dev, prev_offset)?;
            prev_node.next = replacement;
            prev_node.write(dev, prev_offset)?;
        }
    }
    if sb.free_tail == victim_offset {
        sb.free_tail = replacement;
    }
    Ok(())
}

/// Release `[offset, offset + size)` back to the free list by appending it
/// at the tail.
pub fn free(dev: &mut dyn ByteDevice, sb: &mut Superblock, offset: u64, size: u64) -> Result<()> {
    if size < FREE_NODE_SIZE {
        return Err(ParcelError::FreeList);
    }

    let node = FreeNode {
        next: SENTINEL,
        size,
    };
    node.write(dev, offset)?;

    if sb.free_head == SENTINEL {
        sb.free_head = offset;
        sb.free_tail = offset;
    } else {
        let mut tail_node = FreeNode::read(dev, sb.free_tail)?;
        tail_node.next = offset;
        tail_node.write(dev, sb.free_tail)?;
        sb.free_tail = offset;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use zparcel_device::MemoryDevice;

    fn fresh() -> (MemoryDevice, Superblock) {
        let mut dev = MemoryDevice::new();
        let mut sb = Superblock {
            version: crate::record::header::VERSION,
            flags: crate::record::header::FLAG_TAIL_EXTEND,
            tree_head: SENTINEL,
            free_head: 64,
            free_tail: 64,
            tail_ptr: 4096,
            root_uuid: Uuid::nil(),
        };
        let initial = FreeNode {
            next: SENTINEL,
            size: 4096 - 64,
        };
        initial.write(&mut dev, 64).unwrap();
        sb.write(&mut dev).unwrap();
        (dev, sb)
    }

    #[test]
    fn alloc_splits_large_free_node() {
        let (mut dev, mut sb) = fresh();
        let (offset, granted) = alloc(&mut dev, &mut sb, 58).unwrap();
        assert_eq!(offset, 64);
        assert_eq!(granted, 58);
        assert_eq!(sb.free_head, 64 + 58);
    }

    #[test]
    fn alloc_without_victim_extends_tail() {
        let (mut dev, mut sb) = fresh();
        // consume the only free node entirely
        alloc(&mut dev, &mut sb, 4096 - 64).unwrap();
        assert_eq!(sb.free_head, SENTINEL);
        let (offset, granted) = alloc(&mut dev, &mut sb, 100).unwrap();
        assert_eq!(offset, 4096);
        assert_eq!(granted, 100);
        assert_eq!(sb.tail_ptr, 4196);
    }

    #[test]
    fn free_then_alloc_reuses_same_offset() {
        let (mut dev, mut sb) = fresh();
        // drain the list entirely so the next free() creates the sole node
        let (offset, granted) = alloc(&mut dev, &mut sb, 4096 - 64).unwrap();
        assert_eq!(sb.free_head, SENTINEL);

        free(&mut dev, &mut sb, offset, granted).unwrap();
        let (offset2, _) = alloc(&mut dev, &mut sb, 100).unwrap();
        assert_eq!(offset, offset2);
    }

    #[test]
    fn alloc_zero_fails() {
        let (mut dev, mut sb) = fresh();
        assert!(matches!(alloc(&mut dev, &mut sb, 0), Err(ParcelError::NoFree)));
    }
}
