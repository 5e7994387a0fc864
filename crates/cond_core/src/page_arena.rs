//! Page-granular arena: a fixed reservation whose committed prefix only grows.
//!
//! The base address never moves, so offsets handed out by the tables above stay
//! valid for the arena's whole lifetime.

use crate::errors::{CondError, Result};
use crate::platform::{page_size, pages_for, Reservation};

pub struct PageArena {
    region: Reservation,
    reserved_pages: usize,
    committed_pages: usize,
}

impl PageArena {
    /// Claim `page_count` pages of address space at `base` (or OS-chosen) without backing them.
    pub fn reserve(base: Option<usize>, page_count: usize) -> Result<Self> {
        if page_count == 0 {
            return Err(CondError::InvalidConfig("reservation must span at least one page".into()));
        }
        let bytes = page_count
            .checked_mul(page_size())
            .ok_or_else(|| {
                CondError::InvalidConfig(format!("{page_count} pages overflow the address space"))
            })?;
        let region = Reservation::new(base, bytes).map_err(CondError::AllocationFailed)?;
        tracing::debug!(base = region.as_ptr() as usize, pages = page_count, "reserved pages");
        Ok(Self { region, reserved_pages: page_count, committed_pages: 0 })
    }

    /// Reserve and commit the whole range in one step.
    pub fn reserve_and_commit(base: Option<usize>, page_count: usize) -> Result<Self> {
        let mut arena = Self::reserve(base, page_count)?;
        arena.commit(page_count)?;
        Ok(arena)
    }

    /// Back the next `page_count` reserved pages with zeroed read/write memory.
    pub fn commit(&mut self, page_count: usize) -> Result<()> {
        if page_count == 0 {
            return Ok(());
        }
        let target = self.committed_pages + page_count;
        if target > self.reserved_pages {
            return Err(CondError::CapacityExceeded {
                requested: target * page_size(),
                capacity: self.reserved_bytes(),
            });
        }
        let ps = page_size();
        self.region
            .commit(self.committed_pages * ps, page_count * ps)
            .map_err(CondError::AllocationFailed)?;
        tracing::debug!(
            base = self.base_addr(),
            from = self.committed_pages,
            to = target,
            "committed pages"
        );
        self.committed_pages = target;
        Ok(())
    }

    /// Commit exactly the pages needed for `end` bytes to be addressable.
    /// Returns how many pages were newly committed.
    pub fn grow_to(&mut self, end: usize) -> Result<usize> {
        let needed = pages_for(end);
        if needed <= self.committed_pages {
            return Ok(0);
        }
        let extra = needed - self.committed_pages;
        self.commit(extra)?;
        Ok(extra)
    }

    pub fn base_addr(&self) -> usize {
        self.region.as_ptr() as usize
    }

    pub fn reserved_pages(&self) -> usize {
        self.reserved_pages
    }

    pub fn committed_pages(&self) -> usize {
        self.committed_pages
    }

    pub fn reserved_bytes(&self) -> usize {
        self.region.len()
    }

    pub fn committed_bytes(&self) -> usize {
        self.committed_pages * page_size()
    }

    /// The committed prefix.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the committed prefix is mapped read/write and owned by `self`.
        unsafe { std::slice::from_raw_parts(self.region.as_ptr(), self.committed_bytes()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.region.as_ptr(), self.committed_bytes()) }
    }
}

impl std::fmt::Debug for PageArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageArena")
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("reserved_pages", &self.reserved_pages)
            .field("committed_pages", &self.committed_pages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commits_nothing() {
        let arena = PageArena::reserve(None, 8).unwrap();
        assert_eq!(arena.reserved_pages(), 8);
        assert_eq!(arena.committed_pages(), 0);
        assert!(arena.as_slice().is_empty());
    }

    #[test]
    fn grow_to_commits_exactly_what_is_needed() {
        let ps = page_size();
        let mut arena = PageArena::reserve(None, 8).unwrap();
        assert_eq!(arena.grow_to(1).unwrap(), 1);
        assert_eq!(arena.grow_to(ps).unwrap(), 0);
        assert_eq!(arena.grow_to(ps + 1).unwrap(), 1);
        assert_eq!(arena.grow_to(4 * ps + 3).unwrap(), 3);
        assert_eq!(arena.committed_pages(), 5);
        assert_eq!(arena.grow_to(10).unwrap(), 0);
        assert_eq!(arena.committed_pages(), 5);
    }

    #[test]
    fn cannot_commit_past_reservation() {
        let ps = page_size();
        let mut arena = PageArena::reserve_and_commit(None, 2).unwrap();
        assert!(matches!(arena.commit(1), Err(CondError::CapacityExceeded { .. })));
        assert!(matches!(arena.grow_to(2 * ps + 1), Err(CondError::CapacityExceeded { .. })));
        assert_eq!(arena.committed_pages(), 2);
    }

    #[test]
    fn committed_memory_survives_growth() {
        let ps = page_size();
        let mut arena = PageArena::reserve(None, 4).unwrap();
        arena.grow_to(1).unwrap();
        let base = arena.base_addr();
        arena.as_mut_slice()[..5].copy_from_slice(b"hello");
        arena.grow_to(3 * ps).unwrap();
        assert_eq!(arena.base_addr(), base);
        assert_eq!(&arena.as_slice()[..5], b"hello");
        assert!(arena.as_slice()[ps..].iter().all(|b| *b == 0));
    }

    #[test]
    fn zero_pages_is_rejected() {
        assert!(matches!(PageArena::reserve(None, 0), Err(CondError::InvalidConfig(_))));
    }

    #[cfg(all(unix, target_pointer_width = "64"))]
    #[test]
    fn base_hint_is_exact_or_an_error() {
        // Well above anything the allocator hands out by default.
        let want = 0x3a00_0000_0000usize;
        let first = match PageArena::reserve(Some(want), 4) {
            Ok(a) => a,
            Err(_) => return,
        };
        assert_eq!(first.base_addr(), want);
        let second = PageArena::reserve(Some(want), 4);
        assert!(matches!(second, Err(CondError::AllocationFailed(_))));
    }
}
