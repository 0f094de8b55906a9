//! Reference-counted "single pointers".
//!
//! A [`Single`] owns one heap allocation prefixed with a small header holding
//! the strong count, the weak count and the payload's type name. Cloning a
//! handle ([`Single::link`]) increments the strong count and dropping it
//! ([`Single::unlink`]) decrements it. When the last strong handle goes away
//! the payload is dropped exactly once; the payload's own `Drop` is the
//! finalizer, so cleanup never has to be bracketed by hand.
//!
//! [`WeakSingle`] is a non-owning back-reference. It keeps the allocation (but
//! not the payload) alive and is used to break ownership cycles in the type
//! graph, e.g. a recursive structure pointing back at its own identifier.
//!
//! # Thread Safety
//!
//! Counts are plain [`Cell`]s. Neither handle is `Send` or `Sync`: the whole
//! type graph is single-threaded.
//!
//! # Example
//!
//! ```
//! use morph::Single;
//!
//! let a = Single::new(String::from("int")).unwrap();
//! let b = a.link();
//! assert_eq!(Single::strong_count(&a), 2);
//!
//! assert!(!b.unlink());
//! assert!(a.unlink()); // last reference: payload dropped here
//! ```

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// Object header shared by every single pointer.
struct Header {
    strong: Cell<u32>,
    /// Weak handles plus one held collectively by the strong handles.
    weak: Cell<u32>,
    type_name: &'static str,
}

/// Header and payload in one allocation.
#[repr(C)]
pub(crate) struct SingleBox<T: ?Sized> {
    header: Header,
    value: T,
}

/// Owning, reference-counted handle.
///
/// Equality is identity: two handles are equal when they point at the same
/// allocation.
pub struct Single<T: ?Sized> {
    ptr: NonNull<SingleBox<T>>,
    _owns: PhantomData<SingleBox<T>>,
}

impl<T> Single<T> {
    /// Allocates `value` with a strong count of one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the allocation fails.
    pub fn new(value: T) -> Result<Self> {
        let layout = Layout::new::<SingleBox<T>>();

        // SAFETY: the layout is never zero-sized, it always holds a Header.
        let raw = unsafe { alloc::alloc(layout) }.cast::<SingleBox<T>>();
        let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory {
            requested: layout.size(),
        })?;

        // SAFETY: ptr is fresh, sized and aligned for SingleBox<T>.
        unsafe {
            ptr.as_ptr().write(SingleBox {
                header: Header {
                    strong: Cell::new(1),
                    weak: Cell::new(1),
                    type_name: std::any::type_name::<T>(),
                },
                value,
            });
        }

        Ok(Single {
            ptr,
            _owns: PhantomData,
        })
    }

    /// Creates a non-owning back-reference.
    #[must_use]
    pub fn downgrade(this: &Self) -> WeakSingle<T> {
        let header = this.header();
        header.weak.set(header.weak.get() + 1);
        WeakSingle { ptr: this.ptr }
    }

    /// Takes the payload out if `this` is the last strong handle.
    ///
    /// Otherwise `this` is unlinked and `None` is returned; the payload stays
    /// with the remaining owners.
    pub fn into_inner(this: Self) -> Option<T> {
        if this.header().strong.get() != 1 {
            drop(this);
            return None;
        }

        let this = ManuallyDrop::new(this);
        let raw = this.ptr.as_ptr();

        // SAFETY: this is the only strong handle. The payload is moved out
        // exactly once and the strong count is cleared before any weak handle
        // can observe the allocation again.
        unsafe {
            let value = ptr::read(&raw const (*raw).value);
            (*raw).header.strong.set(0);
            release_weak(raw, Layout::new::<SingleBox<T>>());
            Some(value)
        }
    }
}

impl<T: ?Sized> Single<T> {
    /// Returns a new strong handle to the same object.
    ///
    /// # Panics
    ///
    /// Panics (through `fatal!`) if the strong count would overflow.
    #[must_use]
    pub fn link(&self) -> Self {
        let header = self.header();
        let strong = header.strong.get();
        if strong == u32::MAX {
            morph_log::fatal!("reference count overflow on {}", header.type_name);
        }
        header.strong.set(strong + 1);

        Single {
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }

    /// Releases this handle and reports whether it was the last one.
    ///
    /// `true` means the payload has been finalized and freed.
    pub fn unlink(self) -> bool {
        let last = self.header().strong.get() == 1;
        drop(self);
        last
    }

    /// Number of strong handles.
    #[must_use]
    pub fn strong_count(this: &Self) -> u32 {
        this.header().strong.get()
    }

    /// Number of weak handles.
    #[must_use]
    pub fn weak_count(this: &Self) -> u32 {
        this.header().weak.get() - 1
    }

    /// Returns true if both handles point at the same object.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        ptr::addr_eq(a.ptr.as_ptr(), b.ptr.as_ptr())
    }

    /// Name of the concrete payload type, for diagnostics.
    #[must_use]
    pub fn type_name(this: &Self) -> &'static str {
        this.header().type_name
    }

    /// Gives up the handle without touching the count.
    pub(crate) fn into_raw_box(self) -> NonNull<SingleBox<T>> {
        ManuallyDrop::new(self).ptr
    }

    /// Rebuilds a handle from [`into_raw_box`](Self::into_raw_box).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw_box` (possibly unsize-coerced) and its
    /// strong reference must not have been reclaimed already.
    pub(crate) unsafe fn from_raw_box(ptr: NonNull<SingleBox<T>>) -> Self {
        Single {
            ptr,
            _owns: PhantomData,
        }
    }

    fn header(&self) -> &Header {
        // SAFETY: the allocation lives while a strong handle exists.
        unsafe { &(*self.ptr.as_ptr()).header }
    }
}

/// Decrements the weak count and frees the allocation when it reaches zero.
///
/// # Safety
///
/// `raw` must point at a live allocation of `layout` whose payload has
/// already been dropped or moved out.
unsafe fn release_weak<T: ?Sized>(raw: *mut SingleBox<T>, layout: Layout) {
    unsafe {
        let weak = (*raw).header.weak.get() - 1;
        (*raw).header.weak.set(weak);
        if weak == 0 {
            alloc::dealloc(raw.cast::<u8>(), layout);
        }
    }
}

impl<T: ?Sized> Drop for Single<T> {
    fn drop(&mut self) {
        let header = self.header();
        let strong = header.strong.get();
        debug_assert!(strong > 0, "unlink past zero on {}", header.type_name);

        header.strong.set(strong - 1);
        if strong != 1 {
            return;
        }

        morph_log::trace!("finalizing {}", header.type_name);

        let raw = self.ptr.as_ptr();
        // SAFETY: this was the last strong handle. The layout is taken while
        // the payload is still intact, then the payload is dropped once.
        unsafe {
            let layout = Layout::for_value(&*raw);
            ptr::drop_in_place(&raw mut (*raw).value);
            release_weak(raw, layout);
        }
    }
}

impl<T: ?Sized> Clone for Single<T> {
    fn clone(&self) -> Self {
        self.link()
    }
}

impl<T: ?Sized> Deref for Single<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the payload lives while a strong handle exists.
        unsafe { &(*self.ptr.as_ptr()).value }
    }
}

impl<T: ?Sized> PartialEq for Single<T> {
    fn eq(&self, other: &Self) -> bool {
        Single::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Single<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Single<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Non-owning back-reference to a [`Single`].
///
/// Never keeps the payload alive; [`upgrade`](Self::upgrade) fails once the
/// last strong handle is gone.
pub struct WeakSingle<T> {
    ptr: NonNull<SingleBox<T>>,
}

impl<T> WeakSingle<T> {
    /// Returns a strong handle if the payload is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Single<T>> {
        let header = self.header();
        let strong = header.strong.get();
        if strong == 0 {
            return None;
        }
        header.strong.set(strong + 1);

        Some(Single {
            ptr: self.ptr,
            _owns: PhantomData,
        })
    }

    /// Returns true while at least one strong handle exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.header().strong.get() > 0
    }

    /// Returns true if this points at the same object as `single`.
    #[must_use]
    pub fn points_to(&self, single: &Single<T>) -> bool {
        ptr::eq(self.ptr.as_ptr(), single.ptr.as_ptr())
    }

    fn header(&self) -> &Header {
        // SAFETY: the allocation lives while a weak handle exists.
        unsafe { &(*self.ptr.as_ptr()).header }
    }
}

impl<T> Clone for WeakSingle<T> {
    fn clone(&self) -> Self {
        let header = self.header();
        header.weak.set(header.weak.get() + 1);
        WeakSingle { ptr: self.ptr }
    }
}

impl<T> Drop for WeakSingle<T> {
    fn drop(&mut self) {
        // SAFETY: the payload is either alive (strong > 0, so the count cannot
        // reach zero here) or already dropped.
        unsafe { release_weak(self.ptr.as_ptr(), Layout::new::<SingleBox<T>>()) };
    }
}

impl<T> fmt::Debug for WeakSingle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSingle")
            .field("type", &self.header().type_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}
