//! The top-level engine: ties the superblock, tree, allocator and object
//! codecs together behind a `Closed -> Open -> Closed` state machine.

use std::collections::HashMap;
use std::io::Read;

use log::{debug, trace, warn};
use uuid::Uuid;
use zparcel_device::{ByteDevice, ByteDeviceExt};

use crate::alloc;
use crate::error::{ParcelError, Result};
use crate::list::{self, Entry};
use crate::object::{self, ObjectInfo, Value};
use crate::record::header::{Superblock, FLAG_TAIL_EXTEND, SUPERBLOCK_SIZE, VERSION};
use crate::record::node::{TreeNode, NODE_SIZE};
use crate::record::SENTINEL;
use crate::stream::StreamAccessor;
use crate::tree;
use crate::types::ObjectType;

/// A parcel open for reading and writing. Wraps any `ByteDevice` (a real
/// file or an in-memory buffer).
pub struct Parcel<D: ByteDevice> {
    dev: D,
    sb: Superblock,
    cache: HashMap<Uuid, ObjectInfo>,
    open: bool,
}

impl<D: ByteDevice> Parcel<D> {
    /// Formats a fresh parcel: a superblock followed by one free node
    /// covering `[SUPERBLOCK_SIZE, 4096)`, tail-extend enabled.
    pub fn create(mut dev: D) -> Result<Self> {
        const INITIAL_TAIL: u64 = 4096;

        let sb = Superblock {
            version: VERSION,
            flags: FLAG_TAIL_EXTEND,
            tree_head: SENTINEL,
            free_head: SUPERBLOCK_SIZE,
            free_tail: SUPERBLOCK_SIZE,
            tail_ptr: INITIAL_TAIL,
            root_uuid: Uuid::nil(),
        };

        let initial_free = crate::record::free::FreeNode {
            next: SENTINEL,
            size: INITIAL_TAIL - SUPERBLOCK_SIZE,
        };
        initial_free.write(&mut dev, SUPERBLOCK_SIZE)?;
        sb.write(&mut dev)?;

        debug!("formatted new parcel, tail_ptr={}", INITIAL_TAIL);
        Ok(Self {
            dev,
            sb,
            cache: HashMap::new(),
            open: true,
        })
    }

    /// Opens an existing parcel, reading and verifying its superblock.
    pub fn open(mut dev: D) -> Result<Self> {
        let sb = Superblock::read(&mut dev)?;
        Ok(Self {
            dev,
            sb,
            cache: HashMap::new(),
            open: true,
        })
    }

    /// Marks the parcel closed; further operations fail `NotOpen`.
    pub fn close(&mut self) {
        self.open = false;
        self.cache.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(ParcelError::NotOpen)
        }
    }

    fn invalidate(&mut self, uuid: &Uuid) {
        self.cache.remove(uuid);
    }

    /// Consults the descriptor cache before walking the tree from disk.
    fn locate(&mut self, uuid: &Uuid) -> Result<tree::Located> {
        if let Some(info) = self.cache.get(uuid) {
            return Ok(tree::Located {
                offset: info.offset,
                parent: info.parent,
                node: TreeNode {
                    uuid: *uuid,
                    lnode: info.lnode,
                    rnode: info.rnode,
                    object_type: info.object_type,
                    extra: info.extra,
                    inline_payload: info.inline_payload,
                },
            });
        }

        let located = tree::lookup(&mut self.dev, &self.sb, uuid)?;
        let (data_offset, data_size) = if located.node.object_type.is_external() {
            let (o, s) = object::decode_data_ptr(&located.node.inline_payload);
            (Some(o), Some(s))
        } else {
            (None, None)
        };
        self.cache.insert(
            *uuid,
            ObjectInfo {
                offset: located.offset,
                parent: located.parent,
                lnode: located.node.lnode,
                rnode: located.node.rnode,
                object_type: located.node.object_type,
                extra: located.node.extra,
                inline_payload: located.node.inline_payload,
                data_offset,
                data_size,
            },
        );
        Ok(located)
    }

    /// Allocates a fixed, tree-node-sized extent and returns `(offset,
    /// extra)`, rejecting the (unreachable in practice, since the allocator
    /// never grants more than `FREE_NODE_SIZE - 1` bytes of slack) case
    /// where the slack would overflow the 8-bit `extra` field.
    fn alloc_node_extent(&mut self) -> Result<(u64, u8)> {
        let (offset, granted) = alloc::alloc(&mut self.dev, &mut self.sb, NODE_SIZE)?;
        let slack = granted - NODE_SIZE;
        let extra = u8::try_from(slack).map_err(|_| ParcelError::FreeList)?;
        Ok((offset, extra))
    }

    fn decode_value(&mut self, node: &TreeNode) -> Result<Value> {
        if node.object_type.is_external() {
            let (offset, size) = object::decode_data_ptr(&node.inline_payload);
            let mut buf = vec![0u8; size as usize];
            self.dev.seek(offset).map_err(ParcelError::Seek)?;
            self.dev
                .read_exact(&mut buf)
                .map_err(|e| ParcelError::Read(e.to_string()))?;
            object::decode_external(node.object_type, &buf)
        } else {
            object::decode_inline(node.object_type, &node.inline_payload)
        }
    }

    /// Stores any non-file value under `uuid`, failing `Exists` if already
    /// present (live or tombstoned).
    pub fn store(&mut self, uuid: Uuid, value: Value) -> Result<()> {
        self.ensure_open()?;
        self.reject_existing(&uuid)?;

        let object_type = value.object_type();
        let (node_offset, extra) = self.alloc_node_extent()?;

        let inline_payload = if object_type.is_external() {
            let encoded = object::encode_external(&value);
            let (data_offset, data_granted) =
                alloc::alloc(&mut self.dev, &mut self.sb, encoded.len() as u64)?;
            self.dev.seek(data_offset).map_err(ParcelError::Seek)?;
            self.dev
                .write_all(&encoded)
                .map_err(|e| ParcelError::Write(e.to_string()))?;
            object::encode_data_ptr(data_offset, data_granted)
        } else {
            object::encode_inline(&value)
        };

        let node = TreeNode {
            uuid,
            lnode: SENTINEL,
            rnode: SENTINEL,
            object_type,
            extra,
            inline_payload,
        };
        node.write(&mut self.dev, node_offset)?;
        tree::insert(&mut self.dev, &mut self.sb, &uuid, node_offset)?;
        self.sb.write(&mut self.dev)?;
        self.invalidate(&uuid);
        trace!("stored {uuid} as {object_type:?} at {node_offset}");
        Ok(())
    }

    fn reject_existing(&mut self, uuid: &Uuid) -> Result<()> {
        match self.locate(uuid) {
            Ok(_) => Err(ParcelError::Exists),
            Err(ParcelError::NoExist) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Fetches whatever value is stored, without a type check.
    pub fn fetch(&mut self, uuid: Uuid) -> Result<Value> {
        self.ensure_open()?;
        let located = self.locate(&uuid)?;
        if located.node.object_type == ObjectType::Null {
            return Err(ParcelError::NoExist);
        }
        self.decode_value(&located.node)
    }

    /// Fetches a value, rejecting any type other than `expected`.
    pub fn fetch_typed(&mut self, uuid: Uuid, expected: ObjectType) -> Result<Value> {
        self.ensure_open()?;
        let located = self.locate(&uuid)?;
        if located.node.object_type == ObjectType::Null {
            return Err(ParcelError::NoExist);
        }
        if located.node.object_type != expected {
            return Err(ParcelError::TypeMismatch);
        }
        self.decode_value(&located.node)
    }

    pub fn get_type(&mut self, uuid: Uuid) -> Result<ObjectType> {
        self.ensure_open()?;
        Ok(self.locate(&uuid)?.node.object_type)
    }

    pub fn exists(&mut self, uuid: Uuid) -> Result<bool> {
        self.ensure_open()?;
        match self.locate(&uuid) {
            Ok(located) => Ok(located.node.object_type != ObjectType::Null),
            Err(ParcelError::NoExist) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Tombstones the node and frees its external extent, if any. Clears
    /// the root pointer if it named this object.
    pub fn remove(&mut self, uuid: Uuid) -> Result<()> {
        self.ensure_open()?;
        let located = tree::lookup(&mut self.dev, &self.sb, &uuid)?;
        if located.node.object_type == ObjectType::Null {
            return Err(ParcelError::NoExist);
        }

        let mut node = located.node;
        if node.object_type.is_external() {
            let (data_offset, data_size) = object::decode_data_ptr(&node.inline_payload);
            alloc::free(&mut self.dev, &mut self.sb, data_offset, data_size)?;
        }
        tree::tombstone(&mut self.dev, located.offset, &mut node)?;

        if self.sb.root_uuid == uuid {
            warn!("clearing root pointer: {uuid} removed");
            self.sb.root_uuid = Uuid::nil();
        }
        self.sb.write(&mut self.dev)?;
        self.invalidate(&uuid);
        Ok(())
    }

    pub fn set_root(&mut self, uuid: Uuid) -> Result<()> {
        self.ensure_open()?;
        list::set_root(&mut self.dev, &mut self.sb, uuid)?;
        self.sb.write(&mut self.dev)
    }

    pub fn get_root(&self) -> Option<Uuid> {
        list::get_root(&self.sb)
    }

    pub fn list(&mut self) -> Result<Vec<Entry>> {
        self.ensure_open()?;
        list::list(&mut self.dev, &self.sb)
    }

    /// Reserves a blob extent of exactly `len` content bytes (plus its
    /// length prefix) and commits the blob's own tree node immediately,
    /// without writing the content. Returns `(content_base, len)` for the
    /// caller to stream into.
    fn store_blob_reserved(&mut self, uuid: Uuid, len: u64) -> Result<(u64, u64)> {
        self.reject_existing(&uuid)?;

        let (node_offset, extra) = self.alloc_node_extent()?;
        let total = 8 + len;
        let (data_offset, data_granted) = alloc::alloc(&mut self.dev, &mut self.sb, total)?;
        self.dev.seek(data_offset).map_err(ParcelError::Seek)?;
        self.dev
            .write_beu64(len)
            .map_err(|e| ParcelError::Write(e.to_string()))?;

        let node = TreeNode {
            uuid,
            lnode: SENTINEL,
            rnode: SENTINEL,
            object_type: ObjectType::Blob,
            extra,
            inline_payload: object::encode_data_ptr(data_offset, data_granted),
        };
        node.write(&mut self.dev, node_offset)?;
        tree::insert(&mut self.dev, &mut self.sb, &uuid, node_offset)?;
        self.sb.write(&mut self.dev)?;
        self.invalidate(&uuid);
        Ok((data_offset + 8, len))
    }

    /// Stores a file object: a fresh name-string object, a fresh data-blob
    /// object whose content is streamed from `source`, and finally the
    /// file node itself (written last, so a failure mid-stream never makes
    /// `uuid` resolvable).
    pub fn store_file(&mut self, uuid: Uuid, name: &str, mut source: impl Read, len: u64) -> Result<()> {
        self.ensure_open()?;
        self.reject_existing(&uuid)?;

        let name_uuid = Uuid::new_v4();
        self.store(name_uuid, Value::String(name.to_string()))?;

        let data_uuid = Uuid::new_v4();
        let (content_base, content_len) = self.store_blob_reserved(data_uuid, len)?;

        {
            let mut accessor = StreamAccessor::new(&mut self.dev, content_base, content_len);
            let mut remaining = content_len;
            let mut buf = [0u8; 8192];
            while remaining > 0 {
                let want = (buf.len() as u64).min(remaining) as usize;
                let n = source
                    .read(&mut buf[..want])
                    .map_err(|e| ParcelError::Read(e.to_string()))?;
                if n == 0 {
                    return Err(ParcelError::Trunc);
                }
                accessor
                    .write_all(&buf[..n])
                    .map_err(|e| ParcelError::Write(e.to_string()))?;
                remaining -= n as u64;
            }
        }

        self.store(uuid, Value::File(name_uuid, data_uuid))
    }

    /// Fetches a file's name and a stream accessor over its data blob's
    /// content bytes (the length prefix is consumed already).
    pub fn fetch_file(&mut self, uuid: Uuid) -> Result<(String, StreamAccessor<'_>)> {
        self.ensure_open()?;
        let located = tree::lookup(&mut self.dev, &self.sb, &uuid)?;
        if located.node.object_type == ObjectType::Null {
            return Err(ParcelError::NoExist);
        }
        if located.node.object_type != ObjectType::File {
            return Err(ParcelError::TypeMismatch);
        }
        let value = self.decode_value(&located.node)?;
        let Value::File(name_uuid, data_uuid) = value else {
            unreachable!("File type always decodes to Value::File")
        };

        let name = match self.fetch_typed(name_uuid, ObjectType::String)? {
            Value::String(s) => s,
            _ => unreachable!(),
        };

        // Resolved per spec: check the blob tag here, not the uuid tag.
        let data_located = tree::lookup(&mut self.dev, &self.sb, &data_uuid)?;
        if data_located.node.object_type != ObjectType::Blob {
            return Err(ParcelError::TypeMismatch);
        }
        let (blob_offset, _blob_granted) = object::decode_data_ptr(&data_located.node.inline_payload);
        self.dev.seek(blob_offset).map_err(ParcelError::Seek)?;
        let content_len = self.dev.read_beu64().map_err(|e| ParcelError::Read(e.to_string()))?;

        Ok((name, StreamAccessor::new(&mut self.dev, blob_offset + 8, content_len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zparcel_device::MemoryDevice;

    fn fresh() -> Parcel<MemoryDevice> {
        Parcel::create(MemoryDevice::new()).unwrap()
    }

    #[test]
    fn create_reports_initial_header() {
        let parcel = fresh();
        assert_eq!(parcel.sb.tree_head, SENTINEL);
        assert_eq!(parcel.sb.free_head, SUPERBLOCK_SIZE);
        assert_eq!(parcel.sb.free_tail, SUPERBLOCK_SIZE);
        assert_eq!(parcel.sb.tail_ptr, 4096);
        assert!(parcel.get_root().is_none());
    }

    #[test]
    fn store_and_fetch_uint() {
        let mut parcel = fresh();
        let id = Uuid::from_u128(1);
        parcel.store(id, Value::Uint(42)).unwrap();
        assert_eq!(parcel.fetch_typed(id, ObjectType::Uint).unwrap(), Value::Uint(42));
        assert_eq!(parcel.get_type(id).unwrap(), ObjectType::Uint);
    }

    #[test]
    fn duplicate_store_fails_without_mutating() {
        let mut parcel = fresh();
        let id = Uuid::from_u128(1);
        parcel.store(id, Value::String("abc".into())).unwrap();
        assert!(matches!(
            parcel.store(id, Value::String("xyz".into())),
            Err(ParcelError::Exists)
        ));
        assert_eq!(parcel.fetch(id).unwrap(), Value::String("abc".into()));
    }

    #[test]
    fn remove_then_lookup_fails_noexist_and_frees_extent() {
        let mut parcel = fresh();
        let id = Uuid::from_u128(1);
        parcel.store(id, Value::Blob(vec![0xAA; 100])).unwrap();
        let located_before = tree::lookup(&mut parcel.dev, &parcel.sb, &id).unwrap();
        let (offset_before, granted_before) = object::decode_data_ptr(&located_before.node.inline_payload);

        parcel.remove(id).unwrap();
        assert!(matches!(parcel.fetch(id), Err(ParcelError::NoExist)));

        // the freed extent must become available to a subsequent alloc of
        // matching size, i.e. it is reachable in the free list (not
        // necessarily the first node a first-fit scan lands on).
        let mut cur = parcel.sb.free_head;
        let mut found = false;
        while cur != SENTINEL {
            let node = crate::record::free::FreeNode::read(&mut parcel.dev, cur).unwrap();
            if cur == offset_before && node.size == granted_before {
                found = true;
                break;
            }
            cur = node.next;
        }
        assert!(found, "freed data extent not reachable in the free list");
    }

    #[test]
    fn set_root_roundtrips_through_reopen() {
        let mut parcel = fresh();
        let id = Uuid::from_u128(1);
        parcel.store(id, Value::Null).unwrap();
        parcel.set_root(id).unwrap();

        let dev = std::mem::replace(&mut parcel.dev, MemoryDevice::new());
        let mut reopened = Parcel::open(dev).unwrap();
        assert_eq!(reopened.get_root(), Some(id));
    }

    #[test]
    fn store_file_streams_content_and_fetches_it_back() {
        let mut parcel = fresh();
        let id = Uuid::from_u128(1);
        let content = b"hello from a streamed file".to_vec();
        parcel
            .store_file(id, "greeting.txt", Cursor::new(content.clone()), content.len() as u64)
            .unwrap();

        let (name, mut stream) = parcel.fetch_file(id).unwrap();
        assert_eq!(name, "greeting.txt");
        let mut out = vec![0u8; content.len()];
        stream.read_exact(&mut out).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn list_reports_preorder_entries() {
        let mut parcel = fresh();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        parcel.store(a, Value::Uint(1)).unwrap();
        parcel.store(b, Value::String("hi".into())).unwrap();

        let entries = parcel.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uuid, a);
        assert_eq!(entries[1].uuid, b);
    }

    #[test]
    fn operations_fail_after_close() {
        let mut parcel = fresh();
        parcel.close();
        assert!(matches!(parcel.fetch(Uuid::from_u128(1)), Err(ParcelError::NotOpen)));
    }
}
