//! OS virtual-memory services: reserve address space, commit pages inside it, release it.
//!
//! On unix a reservation is an anonymous `PROT_NONE` mapping; committing flips a
//! page-aligned prefix to read/write. Elsewhere the whole reservation is mapped
//! read/write up front through `memmap2` and commit is bookkeeping only.

use crate::consts::FALLBACK_PAGE_SIZE;
use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Granularity of every reserve/commit, queried from the OS once.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(os_page_size)
}

#[cfg(unix)]
fn os_page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 { n as usize } else { FALLBACK_PAGE_SIZE }
}

#[cfg(not(unix))]
fn os_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Whole pages needed to hold `bytes`.
#[inline]
pub fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(page_size())
}

/// A claimed range of address space. Unmapped on drop.
pub(crate) struct Reservation {
    ptr: NonNull<u8>,
    len: usize,
    #[cfg(not(unix))]
    _map: memmap2::MmapMut,
}

impl Reservation {
    /// Claim `len` bytes (a page multiple) at `hint`, or wherever the OS likes.
    ///
    /// A hint that cannot be honored exactly is an error: callers lay tables out
    /// back to back and rely on the placement.
    #[cfg(unix)]
    pub(crate) fn new(hint: Option<usize>, len: usize) -> io::Result<Self> {
        let addr = hint.map_or(std::ptr::null_mut(), |a| a as *mut libc::c_void);
        // SAFETY: no MAP_FIXED, so the kernel never replaces an existing mapping.
        let p = unsafe {
            libc::mmap(addr, len, libc::PROT_NONE, libc::MAP_PRIVATE | libc::MAP_ANON, -1, 0)
        };
        if p == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        if let Some(want) = hint {
            if p as usize != want {
                // SAFETY: `p` is the mapping we just created, of exactly `len` bytes.
                unsafe { libc::munmap(p, len) };
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("address {want:#x} is not available"),
                ));
            }
        }
        let ptr = NonNull::new(p.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;
        Ok(Self { ptr, len })
    }

    #[cfg(not(unix))]
    pub(crate) fn new(hint: Option<usize>, len: usize) -> io::Result<Self> {
        if let Some(want) = hint {
            tracing::warn!(
                base = want,
                "base address hints are unsupported here, using an OS-chosen address"
            );
        }
        let mut map = memmap2::MmapOptions::new().len(len).map_anon()?;
        let ptr = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;
        Ok(Self { ptr, len, _map: map })
    }

    /// Back `[offset, offset+len)` with zero-filled read/write memory.
    #[cfg(unix)]
    pub(crate) fn commit(&mut self, offset: usize, len: usize) -> io::Result<()> {
        debug_assert!(offset + len <= self.len);
        // SAFETY: the range lies inside our own mapping and is page aligned.
        let rc = unsafe {
            libc::mprotect(
                self.ptr.as_ptr().add(offset).cast::<libc::c_void>(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn commit(&mut self, offset: usize, len: usize) -> io::Result<()> {
        debug_assert!(offset + len <= self.len);
        Ok(())
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(unix)]
impl Drop for Reservation {
    fn drop(&mut self) {
        // SAFETY: we own the mapping and nothing borrows it past drop.
        unsafe { libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let ps = page_size();
        assert!(ps >= 1024);
        assert!(ps.is_power_of_two());
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(ps), 1);
        assert_eq!(pages_for(ps + 1), 2);
    }

    #[test]
    fn committed_pages_are_zeroed_and_writable() {
        let ps = page_size();
        let mut r = Reservation::new(None, 4 * ps).unwrap();
        r.commit(0, 2 * ps).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts_mut(r.as_ptr(), 2 * ps) };
        assert!(bytes.iter().all(|b| *b == 0));
        bytes[2 * ps - 1] = 7;
        assert_eq!(bytes[2 * ps - 1], 7);
    }
}
