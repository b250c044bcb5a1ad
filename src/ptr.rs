use std::alloc::Layout;
use std::ptr::{self, NonNull};

use crate::alloc::{self, Allocator};
use crate::core::Count;

/// Heap allocated counter block, along with the allocator that owns the group's memory
struct Header<C, A> {
    counts: C,
    alloc: A,
}

/**
The `(value, counter)` pointer pair of one ownership group

This is a plain pair of pointers: copying it does not touch the counts. The
handles built on top of it are responsible for keeping the counts in line with
the number of copies they hold.
*/
pub(crate) struct RawShared<T: ?Sized, C, A> {
    value: NonNull<T>,
    header: NonNull<Header<C, A>>,
}

impl<T: ?Sized, C, A> Clone for RawShared<T, C, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized, C, A> Copy for RawShared<T, C, A> {}

impl<T: ?Sized, C: Count, A: Allocator> RawShared<T, C, A> {
    /// Start a new group around `value`, with a strong count of one.
    ///
    /// If the counter block cannot be allocated the value is freed, and the
    /// layout of the failed allocation is handed back.
    ///
    /// SAFETY: `value` must point to a live object allocated by `alloc`,
    /// which nothing else will free
    pub(crate) unsafe fn adopt(value: NonNull<T>, alloc: A) -> Result<Self, Layout> {
        let layout = Layout::new::<Header<C, A>>();
        let header = match alloc.allocate(layout) {
            Ok(block) => block.cast::<Header<C, A>>(),
            Err(_) => {
                alloc::free(&alloc, value);
                return Err(layout);
            }
        };

        header.as_ptr().write(Header {
            counts: C::new(),
            alloc,
        });

        log::trace!("new group at {:p} owning {:p}", header, value);
        Ok(Self { value, header })
    }

    pub(crate) fn counts(&self) -> &C {
        // SAFETY: The header lives as long as any strong or weak handle holds this pair
        unsafe { &self.header.as_ref().counts }
    }

    pub(crate) fn allocator(&self) -> &A {
        // SAFETY: See `counts`
        unsafe { &self.header.as_ref().alloc }
    }

    pub(crate) fn value_ptr(&self) -> NonNull<T> {
        self.value
    }

    /// SAFETY: The group must still have a strong member for the lifetime of the reference
    pub(crate) unsafe fn value<'a>(&self) -> &'a T {
        &*self.value.as_ptr()
    }

    /// Identity of the group
    pub(crate) fn addr(&self) -> usize {
        self.header.as_ptr() as usize
    }

    pub(crate) fn join(&self) {
        self.counts().inc_strong();
        log::trace!("joined group at {:p}", self.header);
    }

    /**
    Leave the group as a strong member

    The decrement and the check for zero are a single step. Whoever takes the
    strong count to zero drops the value and returns its memory, and then lets
    go of the implicit weak reference. With no weak handles around, that also
    frees the counter block.

    SAFETY: The caller must be giving up one strong membership, and not use this pair afterwards
    */
    pub(crate) unsafe fn release(self) {
        if !self.counts().dec_strong() {
            log::trace!("left group at {:p}", self.header);
            return;
        }

        alloc::free(self.allocator(), self.value);
        log::trace!("released value at {:p}", self.value);

        self.release_weak();
    }

    /// Leave the group as a weak member (freeing the counter block if it was the last)
    ///
    /// SAFETY: The caller must be giving up one weak membership, and not use this pair afterwards
    pub(crate) unsafe fn release_weak(self) {
        if !self.counts().dec_weak() {
            return;
        }

        // Move the allocator out before its memory goes away
        let Header { counts, alloc } = ptr::read(self.header.as_ptr());
        drop(counts);
        alloc.deallocate(self.header.cast(), Layout::new::<Header<C, A>>());
        log::trace!("freed counter block at {:p}", self.header);
    }
}

impl<T, C: Count, A: Allocator> RawShared<T, C, A> {
    /// Move the value out of the group
    ///
    /// SAFETY: The strong count must just have been taken from one to zero by the caller
    pub(crate) unsafe fn into_value(self) -> T {
        let value = ptr::read(self.value.as_ptr());
        alloc::free_moved(self.allocator(), self.value);
        log::trace!("moved value out of group at {:p}", self.header);

        self.release_weak();
        value
    }
}
