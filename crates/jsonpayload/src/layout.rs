//! Array placement inside a payload buffer.
//!
//! Array fields keep an 8-byte header `{offset, len}` in the fixed area. The
//! elements live in runs appended after the fixed area, all in the same
//! buffer. Growing or shrinking one run moves every byte after it, so the
//! headers of the runs behind it have to move too. The functions here
//! compute that bookkeeping without touching any buffer.
use crate::payload_type::ARRAY_HEADER_SIZE;

/// In-payload header of an array field. `offset == 0` means no run was ever
/// allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrayHeader {
    pub offset: u32,
    pub len: u32,
}

impl ArrayHeader {
    /// Reads a header from the first 8 bytes of `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than a header.
    #[must_use]
    pub fn read(bytes: &[u8]) -> Self {
        let mut offset = [0; 4];
        let mut len = [0; 4];
        offset.copy_from_slice(&bytes[..4]);
        len.copy_from_slice(&bytes[4..ARRAY_HEADER_SIZE]);
        Self {
            offset: u32::from_le_bytes(offset),
            len: u32::from_le_bytes(len),
        }
    }

    /// # Panics
    ///
    /// Panics if `bytes` is shorter than a header.
    pub fn write(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..ARRAY_HEADER_SIZE].copy_from_slice(&self.len.to_le_bytes());
    }

    #[must_use]
    pub fn offset(self) -> usize {
        self.offset as usize
    }

    #[must_use]
    pub fn len(self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// End of the run in bytes.
    #[must_use]
    pub fn end(self, elem_size: usize) -> usize {
        self.offset() + self.len() * elem_size
    }
}

/// Logical size of a payload: the fixed area plus every allocated run.
pub fn real_size(total_size: usize, arrays: impl IntoIterator<Item = (ArrayHeader, usize)>) -> usize {
    arrays
        .into_iter()
        .filter(|(h, _)| h.offset != 0)
        .fold(total_size, |size, (h, elem_size)| size.max(h.end(elem_size)))
}

/// Byte moves needed to resize one array run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    /// Bytes from here to the old real size move by `grow - strip`.
    pub insert: usize,
    pub grow: usize,
    pub strip: usize,
    /// The array's header after the resize.
    pub header: ArrayHeader,
    /// Index of the first new element.
    pub first_pos: usize,
}

impl ResizePlan {
    /// Signed size change of the payload.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn delta(&self) -> isize {
        self.grow as isize - self.strip as isize
    }

    /// Where the bytes at `insert` end up.
    #[must_use]
    pub fn dest(&self) -> usize {
        self.insert + self.grow - self.strip
    }
}

/// Plans adding `count` elements to an array (after its current elements if
/// `append`, replacing them otherwise).
///
/// A run never allocated before is placed at `real_size`. An existing run
/// grows at its end; when replacing, its old elements are stripped.
///
/// # Panics
///
/// Panics if the new length or offset overflows `u32`.
#[must_use]
pub fn plan_array_resize(
    header: ArrayHeader,
    elem_size: usize,
    count: usize,
    append: bool,
    real_size: usize,
) -> ResizePlan {
    let grow = elem_size * count;
    let insert = if header.offset == 0 {
        real_size
    } else {
        header.end(elem_size)
    };
    let (strip, old_len) = if append {
        (0, header.len())
    } else {
        (header.len() * elem_size, 0)
    };
    let offset = if header.offset == 0 {
        insert
    } else {
        header.offset()
    };
    let new_header = ArrayHeader {
        offset: u32::try_from(offset).expect("payload offset exceeds u32"),
        len: u32::try_from(old_len + count).expect("array length exceeds u32"),
    };
    ResizePlan {
        insert,
        grow,
        strip,
        header: new_header,
        first_pos: old_len,
    }
}

/// Moves the headers of runs that start at or after `insert` by `delta`
/// bytes.
///
/// # Panics
///
/// Panics if a shifted offset leaves the `u32` range.
pub fn shift_offsets<'a>(headers: impl IntoIterator<Item = &'a mut ArrayHeader>, insert: usize, delta: isize) {
    for h in headers {
        if h.offset() >= insert && h.offset != 0 {
            let moved = h
                .offset()
                .checked_add_signed(delta)
                .and_then(|o| u32::try_from(o).ok())
                .expect("array offset out of range after relocation");
            h.offset = moved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED: usize = 24;

    fn h(offset: u32, len: u32) -> ArrayHeader {
        ArrayHeader { offset, len }
    }

    #[test]
    fn header_bytes_are_little_endian() {
        let mut buf = [0u8; 8];
        h(0x0102, 3).write(&mut buf);
        assert_eq!(buf, [2, 1, 0, 0, 3, 0, 0, 0]);
        assert_eq!(ArrayHeader::read(&buf), h(0x0102, 3));
    }

    #[test]
    fn real_size_covers_every_run() {
        assert_eq!(real_size(FIXED, []), FIXED);
        assert_eq!(real_size(FIXED, [(h(0, 0), 4)]), FIXED);
        assert_eq!(real_size(FIXED, [(h(40, 2), 8), (h(24, 4), 4)]), 56);
    }

    #[test]
    fn first_allocation_goes_to_the_end() {
        let plan = plan_array_resize(h(0, 0), 4, 3, true, 40);
        assert_eq!(plan.insert, 40);
        assert_eq!(plan.grow, 12);
        assert_eq!(plan.strip, 0);
        assert_eq!(plan.header, h(40, 3));
        assert_eq!(plan.first_pos, 0);
        assert_eq!(plan.dest(), 52);
    }

    #[test]
    fn append_grows_at_run_end() {
        let plan = plan_array_resize(h(24, 2), 8, 1, true, 64);
        assert_eq!(plan.insert, 40);
        assert_eq!(plan.delta(), 8);
        assert_eq!(plan.header, h(24, 3));
        assert_eq!(plan.first_pos, 2);
    }

    #[test]
    fn replace_strips_old_elements() {
        let plan = plan_array_resize(h(24, 4), 4, 1, false, 48);
        assert_eq!(plan.insert, 40);
        assert_eq!(plan.strip, 16);
        assert_eq!(plan.delta(), -12);
        assert_eq!(plan.dest(), 28);
        assert_eq!(plan.header, h(24, 1));
        assert_eq!(plan.first_pos, 0);
    }

    #[test]
    fn only_runs_behind_the_insertion_point_move() {
        let mut headers = [h(24, 2), h(40, 1), h(0, 0), h(48, 0)];
        shift_offsets(&mut headers, 40, 8);
        assert_eq!(headers, [h(24, 2), h(48, 1), h(0, 0), h(56, 0)]);
        shift_offsets(&mut headers, 48, -8);
        assert_eq!(headers, [h(24, 2), h(40, 1), h(0, 0), h(48, 0)]);
    }
}
