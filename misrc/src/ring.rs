//! Dual-mapped SPSC ring buffer (C1).
//!
//! The backing pages are mapped twice into contiguous virtual memory, so
//! `buffer[head % cap]` is always the start of a contiguous region of at
//! least `cap` bytes: callers never special-case a wraparound split. On
//! Linux this is done with `memfd_create` + two `mmap(MAP_FIXED)` calls
//! aliasing the same pages; other platforms fall back to a single mapping
//! and pay an explicit wrap-copy on any read/write that straddles the
//! boundary, per the degraded-but-correct path the protocol allows.

use crate::errors::RingError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded single-producer / single-consumer byte queue.
///
/// `head` and `tail` are monotonically increasing byte counters; only the
/// writer advances `tail` and only the reader advances `head`. Both are
/// normalized back into `[0, cap)` by the reader once `head` exceeds `cap`,
/// which on the dual-mapped backend is a pure bookkeeping step since the
/// underlying bytes are already aliased.
pub struct RingBuffer {
    backend: Backend,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

enum Backend {
    #[cfg(target_os = "linux")]
    DoubleMapped(DoubleMapped),
    Fallback(Vec<u8>),
}

#[cfg(target_os = "linux")]
struct DoubleMapped {
    base: *mut u8,
    len: usize,
}

#[cfg(target_os = "linux")]
unsafe impl Send for DoubleMapped {}
#[cfg(target_os = "linux")]
unsafe impl Sync for DoubleMapped {}

#[cfg(target_os = "linux")]
impl Drop for DoubleMapped {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len * 2);
        }
    }
}

impl RingBuffer {
    /// Allocates a ring of exactly `capacity` bytes, which must be a
    /// multiple of the OS page size.
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        let page = page_size();
        if capacity == 0 || capacity % page != 0 {
            return Err(RingError::CapacityNotPageAligned(capacity));
        }

        let backend = Self::map(capacity)?;

        Ok(Self {
            backend,
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        })
    }

    #[cfg(target_os = "linux")]
    fn map(capacity: usize) -> Result<Backend, RingError> {
        unsafe {
            let name = c"misrc-ring";
            let fd = libc::memfd_create(name.as_ptr(), 0);
            if fd < 0 {
                return Ok(Backend::Fallback(vec![0u8; capacity]));
            }

            if libc::ftruncate(fd, capacity as libc::off_t) != 0 {
                libc::close(fd);
                return Ok(Backend::Fallback(vec![0u8; capacity]));
            }

            let reservation = libc::mmap(
                std::ptr::null_mut(),
                capacity * 2,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if reservation == libc::MAP_FAILED {
                libc::close(fd);
                return Ok(Backend::Fallback(vec![0u8; capacity]));
            }

            let first = libc::mmap(
                reservation,
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            );
            let second = libc::mmap(
                (reservation as *mut u8).add(capacity) as *mut libc::c_void,
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            );
            libc::close(fd);

            if first == libc::MAP_FAILED || second == libc::MAP_FAILED {
                libc::munmap(reservation, capacity * 2);
                return Ok(Backend::Fallback(vec![0u8; capacity]));
            }

            Ok(Backend::DoubleMapped(DoubleMapped {
                base: reservation as *mut u8,
                len: capacity,
            }))
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn map(capacity: usize) -> Result<Backend, RingError> {
        Ok(Backend::Fallback(vec![0u8; capacity]))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn occupied(&self) -> usize {
        self.tail.load(Ordering::Acquire) - self.head.load(Ordering::Acquire)
    }

    /// Returns a pointer to `n` contiguous writable bytes at the current
    /// tail, or `None` if fewer than `n` bytes of free space remain.
    pub fn write_ptr(&self, n: usize) -> Option<*mut u8> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        if self.capacity - (tail - head) < n {
            return None;
        }
        Some(self.slot(tail))
    }

    /// Advances `tail` by `n` bytes, publishing them to the reader.
    pub fn write_finished(&self, n: usize) {
        self.tail.fetch_add(n, Ordering::Release);
    }

    /// Returns a pointer to `n` contiguous readable bytes at the current
    /// head, or `None` if fewer than `n` bytes have been written.
    pub fn read_ptr(&self, n: usize) -> Option<*const u8> {
        if self.occupied() < n {
            return None;
        }
        let head = self.head.load(Ordering::Relaxed);
        Some(self.slot(head) as *const u8)
    }

    /// Consumes `n` bytes starting at the previously returned `read_ptr`.
    /// Normalizes `head`/`tail` back into `[0, capacity)` once `head`
    /// exceeds `capacity`, as the dual mapping makes this purely a
    /// bookkeeping operation on the double-mapped backend.
    pub fn read_finished(&self, n: usize) {
        let head = self.head.fetch_add(n, Ordering::AcqRel) + n;
        if head >= self.capacity {
            self.head.fetch_sub(self.capacity, Ordering::AcqRel);
            self.tail.fetch_sub(self.capacity, Ordering::AcqRel);
        }
    }

    /// Bytes written but not yet read.
    pub fn len(&self) -> usize {
        self.occupied()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    fn slot(&self, offset: usize) -> *mut u8 {
        let local = offset % self.capacity;
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::DoubleMapped(m) => unsafe { m.base.add(local) },
            Backend::Fallback(buf) => {
                // Single mapping: no span straddling the end is ever
                // returned as contiguous; callers using the fallback path
                // must limit any single write/read to `capacity - local`
                // and wrap-copy the remainder themselves via `write_wrapped`
                // / `read_wrapped` below.
                buf.as_ptr().wrapping_add(local) as *mut u8
            }
        }
    }

    /// Copies `src` into the ring at the current tail, wrap-copying across
    /// the boundary on the fallback backend. Prefer `write_ptr` directly
    /// on the double-mapped backend; this helper exists for callers that
    /// must run portably.
    pub fn write_wrapped(&self, src: &[u8]) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if self.capacity - (tail - head) < src.len() {
            return false;
        }
        self.copy_wrapped(tail, src.len(), |local, chunk, off| unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr().add(off), self.raw_at(local), chunk);
        });
        self.write_finished(src.len());
        true
    }

    /// Copies `n` bytes out of the ring at the current head into `dst`,
    /// wrap-copying across the boundary on the fallback backend.
    pub fn read_wrapped(&self, dst: &mut [u8]) -> bool {
        if self.occupied() < dst.len() {
            return false;
        }
        let head = self.head.load(Ordering::Relaxed);
        self.copy_wrapped(head, dst.len(), |local, chunk, off| unsafe {
            std::ptr::copy_nonoverlapping(self.raw_at(local), dst.as_mut_ptr().add(off), chunk);
        });
        self.read_finished(dst.len());
        true
    }

    fn raw_at(&self, local: usize) -> *mut u8 {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::DoubleMapped(m) => unsafe { m.base.add(local) },
            Backend::Fallback(buf) => buf.as_ptr().wrapping_add(local) as *mut u8,
        }
    }

    fn copy_wrapped(&self, offset: usize, len: usize, mut copy: impl FnMut(usize, usize, usize)) {
        let local = offset % self.capacity;
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::DoubleMapped(_) => copy(local, len, 0),
            Backend::Fallback(_) => {
                if local + len <= self.capacity {
                    copy(local, len, 0);
                } else {
                    let first = self.capacity - local;
                    copy(local, first, 0);
                    copy(0, len - first, first);
                }
            }
        }
    }
}

fn page_size() -> usize {
    #[cfg(unix)]
    unsafe {
        libc::sysconf(libc::_SC_PAGESIZE) as usize
    }
    #[cfg(not(unix))]
    {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_aligned(bytes: usize) -> usize {
        let p = page_size();
        bytes.div_ceil(p) * p
    }

    #[test]
    fn rejects_non_page_aligned_capacity() {
        assert!(RingBuffer::new(17).is_err());
    }

    #[test]
    fn bounds_are_monotone_in_n() {
        let cap = page_aligned(4096);
        let rb = RingBuffer::new(cap).unwrap();
        assert!(rb.write_ptr(cap).is_some());
        assert!(rb.write_ptr(cap + 1).is_none());
        rb.write_finished(cap);
        assert!(rb.read_ptr(cap).is_some());
        assert!(rb.read_ptr(cap + 1).is_none());
    }

    #[test]
    fn wrap_preserves_bytes() {
        let cap = page_aligned(4096);
        let rb = RingBuffer::new(cap).unwrap();

        let first = vec![0xAAu8; 3072];
        assert!(rb.write_wrapped(&first));
        let mut out = vec![0u8; 3072];
        assert!(rb.read_wrapped(&mut out));
        assert_eq!(out, first);

        let second = vec![0xBBu8; 3072];
        assert!(rb.write_wrapped(&second));
        let mut out2 = vec![0u8; 3072];
        assert!(rb.read_wrapped(&mut out2));
        assert_eq!(out2, second);
    }

    #[test]
    fn read_write_ptr_roundtrip_through_raw_pointer() {
        let cap = page_aligned(8192);
        let rb = RingBuffer::new(cap).unwrap();

        let ptr = rb.write_ptr(3072).unwrap();
        unsafe {
            for i in 0..3072u8 {
                *ptr.add(i as usize) = i;
            }
        }
        rb.write_finished(3072);
        rb.read_finished(3072);

        let ptr = rb.write_ptr(3072).unwrap();
        unsafe {
            for i in 0..3072usize {
                *ptr.add(i) = (i % 256) as u8;
            }
        }
        rb.write_finished(3072);

        let rptr = rb.read_ptr(3072).unwrap();
        unsafe {
            for i in 0..3072usize {
                assert_eq!(*rptr.add(i), (i % 256) as u8);
            }
        }
    }
}
