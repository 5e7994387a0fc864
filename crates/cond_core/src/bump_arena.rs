//! Linear allocator over a page arena.
//!
//! `BumpArena` is only the cursor: it hands out monotonically increasing byte
//! ranges and never frees one. `TableMemory` binds a cursor to a `PageArena`
//! and commits pages before any byte past the committed prefix is written.

use crate::errors::{CondError, Result};
use crate::page_arena::PageArena;
use crate::platform::pages_for;
use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct BumpArena {
    capacity: usize,
    used: usize,
}

impl BumpArena {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, used: 0 }
    }

    /// End offset an allocation of `size` would reach, if it fits.
    pub fn end_after(&self, size: usize) -> Result<usize> {
        match self.used.checked_add(size) {
            Some(end) if end <= self.capacity => Ok(end),
            _ => Err(CondError::CapacityExceeded {
                requested: self.used.saturating_add(size),
                capacity: self.capacity,
            }),
        }
    }

    /// Hand out the next `size` bytes.
    pub fn allocate(&mut self, size: usize) -> Result<Range<usize>> {
        let end = self.end_after(size)?;
        let start = self.used;
        self.used = end;
        Ok(start..end)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Forget every allocation at once. Memory stays committed.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// Occupancy of one table, as reported by `stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub used_bytes: usize,
    pub capacity_bytes: usize,
    pub committed_pages: usize,
    pub reserved_pages: usize,
}

/// One page arena plus the bump cursor that fills it.
#[derive(Debug)]
pub struct TableMemory {
    pages: PageArena,
    bump: BumpArena,
}

impl TableMemory {
    /// Reserve `capacity` bytes (rounded up to whole pages) and commit `initial_pages`.
    pub fn new(base: Option<usize>, capacity: usize, initial_pages: usize) -> Result<Self> {
        let reserved = pages_for(capacity);
        if initial_pages > reserved {
            return Err(CondError::InvalidConfig(format!(
                "initial_pages {initial_pages} exceeds the {reserved} reserved pages"
            )));
        }
        let mut pages = PageArena::reserve(base, reserved)?;
        pages.commit(initial_pages)?;
        Ok(Self { pages, bump: BumpArena::new(capacity) })
    }

    /// Reserve and commit `capacity` bytes up front.
    pub fn committed(base: Option<usize>, capacity: usize) -> Result<Self> {
        let pages = PageArena::reserve_and_commit(base, pages_for(capacity))?;
        Ok(Self { pages, bump: BumpArena::new(capacity) })
    }

    /// Fail with `CapacityExceeded` unless `n` more bytes fit in the reservation.
    pub fn fits(&self, n: usize) -> Result<()> {
        self.bump.end_after(n).map(|_| ())
    }

    /// Append `n` zeroed bytes, committing pages first if the end crosses into one.
    pub fn extend(&mut self, n: usize) -> Result<Range<usize>> {
        let end = self.bump.end_after(n)?;
        self.pages.grow_to(end)?;
        self.bump.allocate(n)
    }

    /// Append `bytes`, returning the offset they landed at.
    pub fn push(&mut self, bytes: &[u8]) -> Result<usize> {
        let range = self.extend(bytes.len())?;
        let start = range.start;
        self.pages.as_mut_slice()[range].copy_from_slice(bytes);
        Ok(start)
    }

    /// Bytes handed out so far.
    pub fn bytes(&self) -> &[u8] {
        &self.pages.as_slice()[..self.bump.used()]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let used = self.bump.used();
        &mut self.pages.as_mut_slice()[..used]
    }

    pub fn used(&self) -> usize {
        self.bump.used()
    }

    pub fn capacity(&self) -> usize {
        self.bump.capacity()
    }

    pub fn pages(&self) -> &PageArena {
        &self.pages
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            used_bytes: self.bump.used(),
            capacity_bytes: self.bump.capacity(),
            committed_pages: self.pages.committed_pages(),
            reserved_pages: self.pages.reserved_pages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::page_size;

    #[test]
    fn bump_hands_out_sequential_ranges() {
        let mut bump = BumpArena::new(10);
        assert_eq!(bump.allocate(3).unwrap(), 0..3);
        assert_eq!(bump.allocate(0).unwrap(), 3..3);
        assert_eq!(bump.allocate(7).unwrap(), 3..10);
        assert_eq!(bump.remaining(), 0);
        assert!(matches!(
            bump.allocate(1),
            Err(CondError::CapacityExceeded { requested: 11, capacity: 10 })
        ));
        assert_eq!(bump.used(), 10);
        bump.reset();
        assert_eq!(bump.allocate(4).unwrap(), 0..4);
    }

    #[test]
    fn push_commits_before_writing() {
        let ps = page_size();
        let mut mem = TableMemory::new(None, 4 * ps, 1).unwrap();
        mem.extend(ps - 2).unwrap();
        assert_eq!(mem.pages().committed_pages(), 1);

        let off = mem.push(b"abcd").unwrap();
        assert_eq!(off, ps - 2);
        assert_eq!(mem.pages().committed_pages(), 2);
        assert_eq!(&mem.bytes()[off..], b"abcd");
    }

    #[test]
    fn capacity_is_the_reservation_not_the_commit() {
        let ps = page_size();
        let mut mem = TableMemory::new(None, 2 * ps, 0).unwrap();
        assert_eq!(mem.pages().committed_pages(), 0);
        mem.extend(2 * ps).unwrap();
        assert_eq!(mem.pages().committed_pages(), 2);
        let before = mem.stats();
        assert!(matches!(mem.push(b"x"), Err(CondError::CapacityExceeded { .. })));
        assert_eq!(mem.stats(), before);
    }

    #[test]
    fn initial_pages_cannot_exceed_reservation() {
        let ps = page_size();
        assert!(matches!(TableMemory::new(None, ps, 2), Err(CondError::InvalidConfig(_))));
    }
}
