//! Pooled bump allocator for long-lived, same-lifetime nodes.
//!
//! A [`PoolArena`] is a chain of sub-pools. Each sub-pool is a flat byte
//! buffer that only ever hands out memory from the end of its free region;
//! there is no free list and no per-allocation header. Everything is released
//! at once when the arena is dropped (or rewound by [`PoolArena::reset`]).
//!
//! When the active sub-pool cannot satisfy a request a new one is created with
//! double the capacity, and whatever was left in the old one is *retired*:
//! the arena remembers the two retired sub-pools with the most free space
//! (the "fragments") and tries the largest one first on every allocation, so
//! small requests keep filling old pools instead of wasting their tails.
//!
//! # Example
//!
//! ```
//! use morph_mem::arena::PoolArena;
//!
//! let mut arena = PoolArena::new(256);
//!
//! let a = arena.allocate(24, 8).unwrap();
//! let b = arena.allocate(24, 8).unwrap();
//! assert_ne!(a, b);
//! assert_eq!(a.as_ptr() as usize % 8, 0);
//!
//! // Zero-sized requests are rejected rather than aliased.
//! assert!(arena.allocate(0, 8).is_err());
//! ```
//!
//! The arena owns memory only: it never runs destructors, which is why the
//! typed helpers are restricted to `Copy` payloads.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Initial sub-pool capacity used by [`PoolArena::default`].
pub const DEFAULT_POOL_SIZE: usize = 8192;

/// Smallest sub-pool the arena will create.
const MIN_POOL_SIZE: usize = 64;

/// Alignment of every sub-pool buffer.
const POOL_ALIGNMENT: usize = 16;

/// Error type for arena allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// A zero-byte allocation was requested.
    ZeroSized,
    /// The requested alignment is not a power of two.
    InvalidAlignment {
        /// The rejected alignment.
        alignment: usize,
    },
    /// The system allocator refused a new sub-pool.
    OutOfMemory {
        /// Size of the request that could not be served.
        requested: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::ZeroSized => write!(f, "zero-sized arena allocation"),
            AllocError::InvalidAlignment { alignment } => {
                write!(f, "invalid alignment: {alignment} is not a power of two")
            }
            AllocError::OutOfMemory { requested } => {
                write!(f, "arena out of memory: could not allocate {requested} bytes")
            }
        }
    }
}

impl std::error::Error for AllocError {}

/// Allocation statistics for a [`PoolArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Bytes handed out since creation or the last reset, padding excluded.
    pub total_allocated: usize,
    /// Number of sub-pools in the chain.
    pub pool_count: usize,
    /// Sum of all sub-pool capacities.
    pub total_capacity: usize,
    /// Free bytes in the largest tracked fragment.
    pub largest_fragment: usize,
    /// Free bytes in the second-largest tracked fragment.
    pub second_fragment: usize,
}

/// One fixed-capacity buffer in the chain.
struct SubPool {
    start: NonNull<u8>,
    capacity: usize,
    used: usize,
}

impl SubPool {
    fn new(capacity: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(capacity, POOL_ALIGNMENT)
            .map_err(|_| AllocError::OutOfMemory { requested: capacity })?;

        // SAFETY: capacity is never zero (clamped to MIN_POOL_SIZE by callers).
        let start = unsafe { alloc::alloc(layout) };
        let start = NonNull::new(start).ok_or(AllocError::OutOfMemory { requested: capacity })?;

        Ok(SubPool { start, capacity, used: 0 })
    }

    #[inline]
    fn free(&self) -> usize {
        self.capacity - self.used
    }

    /// Bytes to skip so the next allocation lands on `align`.
    #[inline]
    fn padding_for(&self, align: usize) -> usize {
        let addr = self.start.addr().get() + self.used;
        addr.next_multiple_of(align) - addr
    }

    #[inline]
    fn try_alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let padding = self.padding_for(align);
        let needed = padding.checked_add(size)?;
        if needed > self.free() {
            return None;
        }

        // SAFETY: used + padding + size <= capacity (checked above), so the
        // offset stays inside the buffer allocated in `new`.
        let ptr = unsafe { self.start.add(self.used + padding) };
        self.used += needed;
        Some(ptr)
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        let base = self.start.addr().get();
        (base..base + self.capacity).contains(&ptr.addr().get())
    }
}

impl Drop for SubPool {
    fn drop(&mut self) {
        // SAFETY: same size and alignment as the layout used in `new`.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.capacity, POOL_ALIGNMENT);
            alloc::dealloc(self.start.as_ptr(), layout);
        }
    }
}

/// A retired sub-pool and the free space it had when last measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fragment {
    pool: usize,
    free: usize,
}

/// Growable chain of sub-pools with two-fragment reuse.
///
/// The last sub-pool in the chain is the *active* one. Every other sub-pool is
/// retired; the two retired sub-pools with the most free space are tracked in
/// `fragments[0]` (largest) and `fragments[1]` (second largest).
///
/// `PoolArena` is single-threaded: allocation takes `&mut self`.
pub struct PoolArena {
    pools: Vec<SubPool>,
    fragments: [Option<Fragment>; 2],
    initial_capacity: usize,
    min_alignment: usize,
    total_allocated: usize,
}

impl PoolArena {
    /// Creates an empty arena whose first sub-pool will hold `initial_capacity`
    /// bytes, rounded up to a power of two.
    ///
    /// No memory is reserved until the first allocation.
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        Self::with_alignment(initial_capacity, 1)
    }

    /// Creates an arena that aligns every allocation to at least `min_alignment`.
    ///
    /// A `min_alignment` that is not a power of two is rounded up to one.
    #[must_use]
    pub fn with_alignment(initial_capacity: usize, min_alignment: usize) -> Self {
        PoolArena {
            pools: Vec::new(),
            fragments: [None, None],
            initial_capacity: initial_capacity.max(MIN_POOL_SIZE).next_power_of_two(),
            min_alignment: min_alignment.max(1).next_power_of_two(),
            total_allocated: 0,
        }
    }

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// The largest tracked fragment is tried first, then the active sub-pool.
    /// If both fail a new sub-pool is chained and the request is retried once
    /// against it.
    ///
    /// The returned memory is uninitialized and stays valid until the arena is
    /// reset or dropped.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSized`] if `size == 0`
    /// - [`AllocError::InvalidAlignment`] if `align` is not a power of two
    /// - [`AllocError::OutOfMemory`] if a new sub-pool cannot be obtained
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSized);
        }
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { alignment: align });
        }
        let align = align.max(self.min_alignment);

        let ptr = match self.alloc_from_fragment(size, align) {
            Some(ptr) => ptr,
            None => match self.pools.last_mut().and_then(|pool| pool.try_alloc(size, align)) {
                Some(ptr) => ptr,
                None => {
                    self.grow(size, align)?;
                    self.pools
                        .last_mut()
                        .and_then(|pool| pool.try_alloc(size, align))
                        .ok_or(AllocError::OutOfMemory { requested: size })?
                }
            },
        };

        self.total_allocated += size;
        Ok(ptr)
    }

    /// Copies `value` into the arena.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate); zero-sized `T` is rejected.
    pub fn alloc<T: Copy>(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        let ptr = self
            .allocate(size_of::<T>(), align_of::<T>())?
            .cast::<T>();

        // SAFETY: ptr is freshly allocated, sized and aligned for T.
        unsafe { ptr.write(value) };
        Ok(ptr)
    }

    /// Copies a string into the arena.
    ///
    /// The empty string is not stored; a pointer to a static empty string is
    /// returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if the bytes cannot be placed.
    pub fn alloc_str(&mut self, s: &str) -> Result<NonNull<str>, AllocError> {
        if s.is_empty() {
            return Ok(NonNull::from(""));
        }

        let ptr = self.allocate(s.len(), 1)?;

        // SAFETY: the destination holds s.len() fresh bytes that cannot
        // overlap the borrowed source, and the bytes copied are valid UTF-8.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
            let bytes = NonNull::slice_from_raw_parts(ptr, s.len());
            Ok(NonNull::new_unchecked(bytes.as_ptr() as *mut str))
        }
    }

    /// Rewinds every sub-pool, keeping their buffers for reuse.
    ///
    /// Every pointer previously returned by this arena becomes dangling;
    /// taking `&mut self` ensures no borrow derived from the arena survives.
    pub fn reset(&mut self) {
        for pool in &mut self.pools {
            pool.used = 0;
        }
        self.total_allocated = 0;
        self.rescan_fragments();
    }

    /// Returns whether `ptr` points into memory owned by this arena.
    #[must_use]
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.pools.iter().any(|pool| pool.contains(ptr))
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            total_allocated: self.total_allocated,
            pool_count: self.pools.len(),
            total_capacity: self.pools.iter().map(|pool| pool.capacity).sum(),
            largest_fragment: self.fragments[0].map_or(0, |f| f.free),
            second_fragment: self.fragments[1].map_or(0, |f| f.free),
        }
    }

    /// Capacity of the active (most recently chained) sub-pool, if any.
    #[must_use]
    pub fn active_capacity(&self) -> Option<usize> {
        self.pools.last().map(|pool| pool.capacity)
    }

    fn alloc_from_fragment(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let largest = self.fragments[0]?;
        if largest.free < size {
            return None;
        }

        let pool = &mut self.pools[largest.pool];
        let ptr = pool.try_alloc(size, align)?;
        let remaining = pool.free();

        match self.fragments[1] {
            Some(second) if remaining <= second.free => self.rescan_fragments(),
            _ => self.fragments[0] = Some(Fragment { pool: largest.pool, free: remaining }),
        }

        Some(ptr)
    }

    #[cold]
    fn grow(&mut self, size: usize, align: usize) -> Result<(), AllocError> {
        // Fresh buffers start POOL_ALIGNMENT-aligned, so only larger
        // alignments can need padding.
        let slack = if align > POOL_ALIGNMENT { align } else { 0 };
        let needed = size
            .checked_add(slack)
            .ok_or(AllocError::OutOfMemory { requested: size })?;

        let mut capacity = match self.pools.last() {
            Some(active) => active.capacity.saturating_mul(2),
            None => self.initial_capacity,
        };
        while capacity < needed {
            capacity = capacity
                .checked_mul(2)
                .ok_or(AllocError::OutOfMemory { requested: size })?;
        }

        let pool = SubPool::new(capacity)?;
        self.pools.push(pool);

        if let Some(retired) = self.pools.len().checked_sub(2) {
            self.retire(retired);
        }

        morph_log::debug!(
            "arena grew to {} sub-pools (new capacity {capacity} bytes for a {size}-byte request)",
            self.pools.len()
        );
        Ok(())
    }

    /// Records a newly retired sub-pool's leftover space in the fragment pair.
    fn retire(&mut self, pool: usize) {
        let free = self.pools[pool].free();
        if free == 0 {
            return;
        }

        let candidate = Fragment { pool, free };
        match self.fragments {
            [None, _] => self.fragments[0] = Some(candidate),
            [Some(first), _] if free > first.free => {
                self.fragments = [Some(candidate), Some(first)];
            }
            [Some(_), None] => self.fragments[1] = Some(candidate),
            [Some(_), Some(second)] if free > second.free => {
                self.fragments[1] = Some(candidate);
            }
            _ => {}
        }
    }

    /// Recomputes both fragments from every retired sub-pool.
    fn rescan_fragments(&mut self) {
        self.fragments = [None, None];
        let retired = self.pools.len().saturating_sub(1);
        for pool in 0..retired {
            self.retire(pool);
        }
    }
}

impl Default for PoolArena {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl fmt::Debug for PoolArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolArena")
            .field("stats", &self.stats())
            .field("min_alignment", &self.min_alignment)
            .finish()
    }
}
