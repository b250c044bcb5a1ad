use std::alloc::Layout;
use std::ptr::{self, NonNull};

/// The allocator could not provide the requested memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("memory allocation failed")]
pub struct AllocError;

/**
Source of the memory backing an ownership group

Every group takes two blocks from its allocator: one for the value and one for
the counter block. Both are returned to the same allocator when they are released.

# Safety
Memory returned from `allocate` must be valid for `layout` until it is passed back
to `deallocate` of the same allocator (or a clone of it).
*/
pub unsafe trait Allocator {
    /// Zero-sized layouts must succeed without touching the heap
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    /// `ptr` must come from `allocate` on this allocator, with the same `layout`
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

/// The global heap, as used by [`Box`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        // SAFETY: The layout has a non-zero size
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            std::alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// A well-aligned address that is never dereferenced
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: Alignment is never zero
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

// -------------------------------------

/// Place object in memory from `alloc`, handing back the layout on failure
pub(crate) fn allocate<T, A: Allocator>(alloc: &A, object: T) -> Result<NonNull<T>, Layout> {
    let layout = Layout::new::<T>();
    let ptr = alloc.allocate(layout).map_err(|_| layout)?.cast::<T>();

    // SAFETY: Fresh memory, sized and aligned for T
    unsafe { ptr.as_ptr().write(object) };
    Ok(ptr)
}

/// Move the elements of `vec` into one block from `alloc`
pub(crate) fn allocate_slice<T, A: Allocator>(
    alloc: &A,
    mut vec: Vec<T>,
) -> Result<NonNull<[T]>, Layout> {
    let len = vec.len();
    let layout = Layout::for_value(vec.as_slice());
    let ptr = alloc.allocate(layout).map_err(|_| layout)?.cast::<T>();

    // SAFETY:
    // - The block holds exactly `len` elements
    // - The vec gives up its elements, so each is only dropped from the new block
    unsafe {
        ptr::copy_nonoverlapping(vec.as_ptr(), ptr.as_ptr(), len);
        vec.set_len(0);
    }

    Ok(NonNull::slice_from_raw_parts(ptr, len))
}

/// Drop the object and give its memory back to `alloc`
/// SAFETY: Must point to a live object allocated by `alloc`
pub(crate) unsafe fn free<T: ?Sized, A: Allocator>(alloc: &A, ptr: NonNull<T>) {
    let layout = Layout::for_value(ptr.as_ref());
    ptr::drop_in_place(ptr.as_ptr());
    alloc.deallocate(ptr.cast(), layout);
}

/// Give the memory of an already moved-out object back to `alloc`
/// SAFETY: Must point to memory allocated by `alloc`, and the object must not be used again
pub(crate) unsafe fn free_moved<T, A: Allocator>(alloc: &A, ptr: NonNull<T>) {
    alloc.deallocate(ptr.cast(), Layout::new::<T>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized() {
        let layout = Layout::new::<()>();
        let ptr = Global.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
        unsafe { Global.deallocate(ptr, layout) };
    }

    #[test]
    fn place_and_free() {
        let ptr = allocate(&Global, String::from("hello")).unwrap();
        assert_eq!(unsafe { ptr.as_ref() }, "hello");
        unsafe { free(&Global, ptr) };
    }

    #[test]
    fn slice_from_vec() {
        let ptr = allocate_slice(&Global, vec![String::from("a"), String::from("b")]).unwrap();
        let slice = unsafe { ptr.as_ref() };
        assert_eq!(slice, ["a", "b"]);
        unsafe { free(&Global, ptr) };
    }

    #[test]
    fn empty_slice() {
        let ptr = allocate_slice::<u64, _>(&Global, Vec::new()).unwrap();
        assert!(unsafe { ptr.as_ref() }.is_empty());
        unsafe { free(&Global, ptr) };
    }

    #[test]
    fn by_reference() {
        let alloc = &Global;
        let ptr = allocate(&alloc, [1u8; 16]).unwrap();
        unsafe { free(&alloc, ptr) };
    }
}
