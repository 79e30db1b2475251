//! Reference-counted, copy-on-write storage for one record.
//!
//! A [`PayloadValue`] is a cheap handle: cloning it shares the underlying
//! block and bumps an atomic reference count. Every mutating method first
//! makes the block exclusive, so a write never becomes visible through
//! another handle.
//!
//! String and tuple values are kept in a per-block arena next to the bytes;
//! field slots store a 1-based index into it (0 means empty). The arena is
//! cloned together with the bytes, so string lifetimes follow the block
//! without separate bookkeeping.
use alloc::{sync::Arc, vec, vec::Vec};
use core::sync::atomic::{AtomicI64, Ordering};

use crate::variant::Variant;

const DEFAULT_LSN: i64 = -1;

#[derive(Debug)]
struct Block {
    lsn: AtomicI64,
    bytes: Vec<u8>,
    strings: Vec<Variant>,
}

impl Block {
    fn zeroed(size: usize) -> Self {
        Self {
            lsn: AtomicI64::new(DEFAULT_LSN),
            bytes: vec![0; size],
            strings: Vec::new(),
        }
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            lsn: AtomicI64::new(self.lsn.load(Ordering::Acquire)),
            bytes: self.bytes.clone(),
            strings: self.strings.clone(),
        }
    }
}

/// Shared handle to a payload block.
///
/// The default value is free: it holds no storage.
///
/// # Examples
///
/// ```
/// use jsonpayload::PayloadValue;
///
/// let mut a = PayloadValue::new(8);
/// let b = a.clone();
/// assert_eq!(a.ref_count(), 2);
///
/// a.as_bytes_mut()[0] = 1;
/// assert_eq!(a.as_bytes()[0], 1);
/// assert_eq!(b.as_bytes()[0], 0);
/// assert!(!a.ptr_eq(&b));
/// ```
#[derive(Clone, Debug, Default)]
pub struct PayloadValue {
    block: Option<Arc<Block>>,
}

impl PayloadValue {
    /// Allocates `size` zeroed bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::from_bytes(size, None, 0)
    }

    /// Allocates `max(size, cap)` zeroed bytes and copies up to `size` bytes
    /// of `src` into them.
    #[must_use]
    pub fn from_bytes(size: usize, src: Option<&[u8]>, cap: usize) -> Self {
        let mut block = Block::zeroed(size.max(cap));
        if let Some(src) = src {
            let n = size.min(src.len());
            block.bytes[..n].copy_from_slice(&src[..n]);
        }
        Self {
            block: Some(Arc::new(block)),
        }
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.block.is_none()
    }

    /// Drops this handle's reference. The storage is released once no
    /// handle refers to it.
    pub fn free(&mut self) {
        self.block = None;
    }

    /// Usable bytes in the block, 0 when free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.block.as_ref().map_or(0, |b| b.bytes.len())
    }

    /// Number of handles sharing the block, 0 when free.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.block.as_ref().map_or(0, Arc::strong_count)
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.ref_count() > 1
    }

    /// Returns `true` if both handles share one block.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.block, &other.block) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Log sequence number of the record; 0 when free.
    #[must_use]
    pub fn lsn(&self) -> i64 {
        self.block
            .as_ref()
            .map_or(0, |b| b.lsn.load(Ordering::Acquire))
    }

    /// Sets the log sequence number. The header is shared, so every handle
    /// of this block observes the new value.
    ///
    /// # Panics
    ///
    /// Panics if the value is free.
    pub fn set_lsn(&self, lsn: i64) {
        let block = self.block.as_ref().expect("set_lsn on a free payload value");
        block.lsn.store(lsn, Ordering::Release);
    }

    /// Makes this handle the only owner of its block, copying the block when
    /// it is shared. A free value gets a fresh block of `new_size` bytes; a
    /// copied block is at least `new_size` bytes long.
    pub fn clone_if_shared(&mut self, new_size: usize) {
        let Some(block) = self.block.as_mut() else {
            self.block = Some(Arc::new(Block::zeroed(new_size)));
            return;
        };
        if Arc::get_mut(block).is_none() {
            let mut copy = Block::clone(block);
            if copy.bytes.len() < new_size {
                copy.bytes.resize(new_size, 0);
            }
            *block = Arc::new(copy);
        }
    }

    fn block_mut(&mut self) -> &mut Block {
        Arc::make_mut(self.block.get_or_insert_with(|| Arc::new(Block::zeroed(0))))
    }

    /// Changes the logical size from `old_size` to `new_size`.
    ///
    /// Bytes below `min(old_size, new_size)` are preserved and bytes in
    /// `old_size..new_size` are zeroed. Storage never shrinks.
    pub fn resize(&mut self, old_size: usize, new_size: usize) {
        let block = self.block_mut();
        debug_assert!(old_size <= block.bytes.len());
        if new_size > block.bytes.len() {
            block.bytes.resize(new_size, 0);
        }
        if new_size > old_size {
            block.bytes[old_size..new_size].fill(0);
        }
    }

    /// The block's bytes; empty when free.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.block.as_ref().map_or(&[][..], |b| b.bytes.as_slice())
    }

    /// Mutable access to the bytes. Unshares the block first.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.block_mut().bytes
    }

    pub(crate) fn string(&self, id: u32) -> Option<&Variant> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        self.block.as_ref()?.strings.get(idx)
    }

    /// Stores a string or tuple value and returns its 1-based handle.
    pub(crate) fn push_string(&mut self, value: Variant) -> u32 {
        let strings = &mut self.block_mut().strings;
        strings.push(value);
        u32::try_from(strings.len()).expect("string storage exceeds u32 handles")
    }

    /// Overwrites the entry behind handle `id`. Returns `false` if there is
    /// no such entry.
    pub(crate) fn replace_string(&mut self, id: u32, value: Variant) -> bool {
        let Some(idx) = usize::try_from(id).ok().and_then(|id| id.checked_sub(1)) else {
            return false;
        };
        if idx >= self.strings_len() {
            return false;
        }
        self.block_mut().strings[idx] = value;
        true
    }

    pub(crate) fn strings_len(&self) -> usize {
        self.block.as_ref().map_or(0, |b| b.strings.len())
    }

    pub(crate) fn replace_strings(&mut self, strings: Vec<Variant>) -> Vec<Variant> {
        core::mem::replace(&mut self.block_mut().strings, strings)
    }
}
