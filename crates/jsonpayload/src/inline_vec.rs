//! A sequence container that keeps up to `N` elements inline.
//!
//! [`InlineVec`] behaves like a `Vec<T>` for the operations the payload engine
//! needs, but stores its first `N` elements inside the container itself. Short
//! sequences (tag paths, value lists, per-field cursors, serializer scratch
//! space) never touch the allocator.
//!
//! Once the container has spilled to the heap it stays there, even if elements
//! are removed again. [`InlineVec::shrink_to_fit`] moves the elements back
//! inline when they fit.
//!
//! # Examples
//!
//! ```
//! use jsonpayload::InlineVec;
//!
//! let mut v: InlineVec<u32, 2> = InlineVec::new();
//! v.push(1);
//! v.push(2);
//! assert!(v.is_inline());
//! v.push(3);
//! assert!(!v.is_inline());
//! assert_eq!(v.as_slice(), &[1, 2, 3]);
//! ```
use alloc::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use core::{
    fmt,
    hash::{Hash, Hasher},
    iter::FusedIterator,
    mem::{self, ManuallyDrop, MaybeUninit},
    ops::{Deref, DerefMut, Range},
    ptr::{self, NonNull},
    slice,
};

struct HeapData<T> {
    ptr: NonNull<T>,
    cap: usize,
}

impl<T> Clone for HeapData<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HeapData<T> {}

union RawData<T, const N: usize> {
    inline: ManuallyDrop<MaybeUninit<[T; N]>>,
    heap: HeapData<T>,
}

/// Growable sequence with inline storage for `N` elements.
pub struct InlineVec<T, const N: usize> {
    len: usize,
    on_heap: bool,
    data: RawData<T, N>,
}

// SAFETY: `InlineVec` owns its elements exactly like `Vec<T>` does.
unsafe impl<T: Send, const N: usize> Send for InlineVec<T, N> {}
// SAFETY: shared access only hands out `&T`.
unsafe impl<T: Sync, const N: usize> Sync for InlineVec<T, N> {}

impl<T, const N: usize> InlineVec<T, N> {
    /// Creates an empty container using inline storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            on_heap: false,
            data: RawData {
                inline: ManuallyDrop::new(MaybeUninit::uninit()),
            },
        }
    }

    /// Creates an empty container able to hold `cap` elements without
    /// reallocating.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        let mut v = Self::new();
        v.reserve(cap);
        v
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current storage can hold.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.on_heap {
            // SAFETY: `on_heap` selects the `heap` variant.
            unsafe { self.data.heap.cap }
        } else {
            N
        }
    }

    /// Returns `true` while the elements live in the inline region.
    #[inline]
    #[must_use]
    pub fn is_inline(&self) -> bool {
        !self.on_heap
    }

    /// Bytes allocated on the heap by this container.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        if self.on_heap {
            self.capacity() * mem::size_of::<T>()
        } else {
            0
        }
    }

    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        if self.on_heap {
            // SAFETY: `on_heap` selects the `heap` variant.
            unsafe { self.data.heap.ptr.as_ptr() }
        } else {
            // SAFETY: `!on_heap` selects the `inline` variant.
            unsafe { self.data.inline.as_ptr().cast::<T>() }
        }
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        if self.on_heap {
            // SAFETY: `on_heap` selects the `heap` variant.
            unsafe { self.data.heap.ptr.as_ptr() }
        } else {
            // SAFETY: `!on_heap` selects the `inline` variant.
            unsafe { (*self.data.inline).as_mut_ptr().cast::<T>() }
        }
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` elements are initialized.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        // SAFETY: the first `len` elements are initialized.
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
    }

    /// Ensures room for at least `cap` elements in total.
    ///
    /// Moves the elements to a heap region of exactly `cap` elements if the
    /// current storage is smaller. Never moves heap storage back inline.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or the requested size overflows.
    pub fn reserve(&mut self, cap: usize) {
        if cap <= self.capacity() {
            return;
        }
        assert!(
            mem::size_of::<T>() != 0,
            "zero-sized element types are not supported"
        );
        let layout = Layout::array::<T>(cap).expect("capacity overflow");
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc(layout) }.cast::<T>();
        let Some(new_ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout)
        };
        // SAFETY: the regions do not overlap and the source holds `len`
        // initialized elements; ownership moves bitwise.
        unsafe { ptr::copy_nonoverlapping(self.as_ptr(), new_ptr.as_ptr(), self.len) };
        self.release_heap();
        self.data = RawData {
            heap: HeapData { ptr: new_ptr, cap },
        };
        self.on_heap = true;
    }

    /// Grows the storage so that `len` elements fit, reserving
    /// `len + 2 * capacity` when a reallocation is needed.
    #[inline]
    fn grow(&mut self, len: usize) {
        let cap = self.capacity();
        if len > cap {
            self.reserve(len + cap * 2);
        }
    }

    fn release_heap(&mut self) {
        if self.on_heap {
            // SAFETY: `on_heap` selects the `heap` variant, allocated with this
            // exact layout in `reserve` or `shrink_to_fit`.
            unsafe {
                let heap = self.data.heap;
                let layout = Layout::array::<T>(heap.cap).unwrap_unchecked();
                dealloc(heap.ptr.as_ptr().cast(), layout);
            }
            self.on_heap = false;
        }
    }

    pub fn push(&mut self, value: T) {
        self.grow(self.len + 1);
        // SAFETY: capacity is at least `len + 1`.
        unsafe { self.as_mut_ptr().add(self.len).write(value) };
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the element at `len` was initialized and is now outside the
        // live range, so it is read exactly once.
        Some(unsafe { self.as_ptr().add(self.len).read() })
    }

    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        let len = self.len;
        assert!(
            index <= len,
            "insertion index (is {index}) should be <= len (is {len})"
        );
        self.grow(len + 1);
        // SAFETY: capacity is at least `len + 1`; the tail is shifted up by one
        // before the slot is overwritten.
        unsafe {
            let p = self.as_mut_ptr().add(index);
            ptr::copy(p, p.add(1), len - index);
            p.write(value);
        }
        self.len = len + 1;
    }

    /// Removes and returns the element at `index`, shifting the tail down.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(index < len, "removal index (is {index}) should be < len (is {len})");
        // SAFETY: `index` is in bounds; the tail is moved over the read slot.
        unsafe {
            let p = self.as_mut_ptr().add(index);
            let value = p.read();
            ptr::copy(p.add(1), p, len - index - 1);
            self.len = len - 1;
            value
        }
    }

    /// Drops the elements in `range` and closes the gap.
    ///
    /// # Panics
    ///
    /// Panics if the range is decreasing or extends past `len`.
    pub fn erase(&mut self, range: Range<usize>) {
        let Range { start, end } = range;
        let len = self.len;
        assert!(
            start <= end && end <= len,
            "erase range {start}..{end} out of bounds for length {len}"
        );
        if start == end {
            return;
        }
        // Elements past `start` are leaked rather than double dropped if a
        // destructor panics.
        self.len = start;
        // SAFETY: `[start, end)` is initialized and dropped once; the tail is
        // then moved down over it.
        unsafe {
            let p = self.as_mut_ptr();
            if mem::needs_drop::<T>() {
                ptr::drop_in_place(slice::from_raw_parts_mut(p.add(start), end - start));
            }
            ptr::copy(p.add(end), p.add(start), len - end);
        }
        self.len = len - (end - start);
    }

    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let old = self.len;
        self.len = len;
        if mem::needs_drop::<T>() {
            // SAFETY: `[len, old)` was initialized and is no longer reachable.
            unsafe {
                ptr::drop_in_place(slice::from_raw_parts_mut(
                    self.as_mut_ptr().add(len),
                    old - len,
                ));
            }
        }
    }

    /// Removes every element. Heap storage, if any, is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Resizes to `len`, filling new slots with values produced by `f`.
    pub fn resize_with(&mut self, len: usize, mut f: impl FnMut() -> T) {
        if len <= self.len {
            self.truncate(len);
            return;
        }
        self.grow(len);
        while self.len < len {
            // SAFETY: capacity is at least `len`.
            unsafe { self.as_mut_ptr().add(self.len).write(f()) };
            self.len += 1;
        }
    }

    /// Releases unused heap capacity. Elements move back inline when at most
    /// `N` remain.
    pub fn shrink_to_fit(&mut self) {
        if !self.on_heap || self.len == self.capacity() {
            return;
        }
        let len = self.len;
        if len <= N {
            let mut inline = MaybeUninit::<[T; N]>::uninit();
            // SAFETY: `len <= N` elements fit inline; ownership moves bitwise
            // and the heap region is released without dropping them.
            unsafe {
                ptr::copy_nonoverlapping(self.as_ptr(), inline.as_mut_ptr().cast::<T>(), len);
            }
            self.release_heap();
            self.data = RawData {
                inline: ManuallyDrop::new(inline),
            };
        } else {
            let layout = Layout::array::<T>(len).expect("capacity overflow");
            // SAFETY: `len > N >= 0` and `T` is not zero-sized on the heap path.
            let raw = unsafe { alloc(layout) }.cast::<T>();
            let Some(new_ptr) = NonNull::new(raw) else {
                handle_alloc_error(layout)
            };
            // SAFETY: distinct allocations; elements move bitwise.
            unsafe { ptr::copy_nonoverlapping(self.as_ptr(), new_ptr.as_ptr(), len) };
            self.release_heap();
            self.data = RawData {
                heap: HeapData { ptr: new_ptr, cap: len },
            };
            self.on_heap = true;
        }
    }
}

impl<T: Clone, const N: usize> InlineVec<T, N> {
    pub fn resize(&mut self, len: usize, value: T) {
        self.resize_with(len, || value.clone());
    }

    /// Inserts clones of `items` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert_from_slice(&mut self, index: usize, items: &[T]) {
        let len = self.len;
        assert!(
            index <= len,
            "insertion index (is {index}) should be <= len (is {len})"
        );
        let count = items.len();
        self.grow(len + count);
        // The tail is leaked rather than double dropped if `clone` panics.
        self.len = index;
        // SAFETY: capacity is at least `len + count`; the tail is moved out of
        // the way before the gap is filled.
        unsafe {
            let p = self.as_mut_ptr().add(index);
            ptr::copy(p, p.add(count), len - index);
            for (i, item) in items.iter().enumerate() {
                p.add(i).write(item.clone());
            }
        }
        self.len = len + count;
    }

    pub fn extend_from_slice(&mut self, items: &[T]) {
        self.insert_from_slice(self.len, items);
    }
}

impl<T, const N: usize> Drop for InlineVec<T, N> {
    fn drop(&mut self) {
        self.truncate(0);
        self.release_heap();
    }
}

impl<T, const N: usize> Default for InlineVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, const N: usize> Clone for InlineVec<T, N> {
    fn clone(&self) -> Self {
        let mut v = Self::with_capacity(self.len);
        v.extend_from_slice(self);
        v
    }
}

impl<T, const N: usize> Deref for InlineVec<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize> DerefMut for InlineVec<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for InlineVec<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, const N: usize, const M: usize> PartialEq<InlineVec<T, M>> for InlineVec<T, N> {
    fn eq(&self, other: &InlineVec<T, M>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: PartialEq, const N: usize> PartialEq<[T]> for InlineVec<T, N> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Eq, const N: usize> Eq for InlineVec<T, N> {}

impl<T: Hash, const N: usize> Hash for InlineVec<T, N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T, const N: usize> Extend<T> for InlineVec<T, N> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.grow(self.len + lower);
        for item in iter {
            self.push(item);
        }
    }
}

impl<T, const N: usize> FromIterator<T> for InlineVec<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut v = Self::new();
        v.extend(iter);
        v
    }
}

impl<T: Clone, const N: usize> From<&[T]> for InlineVec<T, N> {
    fn from(items: &[T]) -> Self {
        let mut v = Self::with_capacity(items.len());
        v.extend_from_slice(items);
        v
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a InlineVec<T, N> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a mut InlineVec<T, N> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Owning iterator over the elements of an [`InlineVec`].
pub struct IntoIter<T, const N: usize> {
    vec: InlineVec<T, N>,
    pos: usize,
    end: usize,
}

impl<T, const N: usize> IntoIterator for InlineVec<T, N> {
    type Item = T;
    type IntoIter = IntoIter<T, N>;

    fn into_iter(mut self) -> Self::IntoIter {
        let end = self.len;
        // The iterator owns `[pos, end)` from here on.
        self.len = 0;
        IntoIter {
            vec: self,
            pos: 0,
            end,
        }
    }
}

impl<T, const N: usize> Iterator for IntoIter<T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.pos == self.end {
            return None;
        }
        // SAFETY: `pos < end` and each slot is read once.
        let item = unsafe { self.vec.as_ptr().add(self.pos).read() };
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end - self.pos;
        (n, Some(n))
    }
}

impl<T, const N: usize> ExactSizeIterator for IntoIter<T, N> {}

impl<T, const N: usize> FusedIterator for IntoIter<T, N> {}

impl<T, const N: usize> Drop for IntoIter<T, N> {
    fn drop(&mut self) {
        if mem::needs_drop::<T>() {
            // SAFETY: `[pos, end)` is still initialized and owned here.
            unsafe {
                ptr::drop_in_place(slice::from_raw_parts_mut(
                    self.vec.as_mut_ptr().add(self.pos),
                    self.end - self.pos,
                ));
            }
        }
    }
}

/// Builds an [`InlineVec`] from a list of elements.
///
/// ```
/// use jsonpayload::{InlineVec, inline_vec};
///
/// let v: InlineVec<u16, 4> = inline_vec![1, 2, 3];
/// assert_eq!(v.len(), 3);
/// ```
#[macro_export]
macro_rules! inline_vec {
    () => {
        $crate::InlineVec::new()
    };
    ($($x:expr),+ $(,)?) => {{
        let mut v = $crate::InlineVec::new();
        $(v.push($x);)+
        v
    }};
}

#[cfg(test)]
mod tests {
    use alloc::{rc::Rc, string::String, vec::Vec};
    use core::cell::Cell;

    use rstest::rstest;

    use super::*;

    #[test]
    fn stays_inline_up_to_capacity() {
        let mut v: InlineVec<u64, 4> = InlineVec::new();
        for i in 0..4 {
            v.push(i);
        }
        assert!(v.is_inline());
        assert_eq!(v.heap_size(), 0);
        v.push(4);
        assert!(!v.is_inline());
        assert_eq!(v.as_slice(), &[0, 1, 2, 3, 4]);
        // 5 + 2 * 4
        assert_eq!(v.capacity(), 13);
    }

    #[test]
    fn does_not_return_inline_on_its_own() {
        let mut v: InlineVec<String, 2> = (0..5).map(|i| alloc::format!("s{i}")).collect();
        v.truncate(1);
        assert!(!v.is_inline());
        v.shrink_to_fit();
        assert!(v.is_inline());
        assert_eq!(v.as_slice(), &[String::from("s0")]);
    }

    #[test]
    fn shrink_keeps_heap_when_too_long() {
        let mut v: InlineVec<u8, 2> = (0..10).collect();
        v.truncate(5);
        v.shrink_to_fit();
        assert!(!v.is_inline());
        assert_eq!(v.capacity(), 5);
        assert_eq!(v.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[rstest]
    #[case::front(0, &[9, 0, 1, 2])]
    #[case::middle(2, &[0, 1, 9, 2])]
    #[case::back(3, &[0, 1, 2, 9])]
    fn insert_at(#[case] pos: usize, #[case] expected: &[u8]) {
        let mut v: InlineVec<u8, 4> = inline_vec![0, 1, 2];
        v.insert(pos, 9);
        assert_eq!(v.as_slice(), expected);
        assert!(v.is_inline());
    }

    #[rstest]
    #[case::empty(1..1, &[0, 1, 2, 3, 4])]
    #[case::head(0..2, &[2, 3, 4])]
    #[case::middle(1..4, &[0, 4])]
    #[case::tail(3..5, &[0, 1, 2])]
    #[case::all(0..5, &[])]
    fn erase_range(#[case] range: Range<usize>, #[case] expected: &[u8]) {
        let mut v: InlineVec<u8, 2> = (0..5).collect();
        v.erase(range);
        assert_eq!(v.as_slice(), expected);
    }

    #[test]
    fn insert_from_slice_spills() {
        let mut v: InlineVec<u8, 3> = inline_vec![1, 5];
        v.insert_from_slice(1, &[2, 3, 4]);
        assert_eq!(v.as_slice(), &[1, 2, 3, 4, 5]);
        assert!(!v.is_inline());
    }

    #[test]
    fn drops_every_element_once() {
        let counter = Rc::new(Cell::new(0));
        struct Probe(Rc<Cell<usize>>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }
        {
            let mut v: InlineVec<Probe, 2> = InlineVec::new();
            for _ in 0..6 {
                v.push(Probe(counter.clone()));
            }
            v.erase(1..3);
            assert_eq!(counter.get(), 2);
            drop(v.pop());
            assert_eq!(counter.get(), 3);
            let mut it = v.into_iter();
            drop(it.next());
            assert_eq!(counter.get(), 4);
        }
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn clone_is_deep_and_take_resets_source() {
        let mut a: InlineVec<String, 1> = inline_vec![String::from("a"), String::from("b")];
        let b = a.clone();
        a[0].push('!');
        assert_eq!(b.as_slice(), &[String::from("a"), String::from("b")]);
        let moved = mem::take(&mut a);
        assert!(a.is_empty());
        assert!(a.is_inline());
        assert_eq!(moved.len(), 2);
    }

    #[test]
    fn equality_ignores_inline_capacity() {
        let a: InlineVec<u8, 1> = inline_vec![1, 2, 3];
        let b: InlineVec<u8, 8> = inline_vec![1, 2, 3];
        assert_eq!(a, b);
        assert!(a == [1u8, 2, 3][..]);
        assert_ne!(a, InlineVec::<u8, 8>::from([1u8, 2].as_slice()));
    }

    #[test]
    fn resize_fills_and_truncates() {
        let mut v: InlineVec<u32, 2> = InlineVec::new();
        v.resize(4, 7);
        assert_eq!(v.as_slice(), &[7, 7, 7, 7]);
        v.resize(1, 0);
        assert_eq!(v.as_slice(), &[7]);
        let collected: Vec<u32> = v.into_iter().collect();
        assert_eq!(collected, [7]);
    }
}
