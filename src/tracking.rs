/*!
An allocator that keeps books on every block it hands out

[`TrackingAlloc`] forwards to [`Global`], recording each allocation and
deallocation. Freeing an address it does not consider live is counted as a
double free, and the block is *not* passed on, so the mistake shows up in the
numbers instead of corrupting the heap.

```
use shrd::tracking::TrackingAlloc;
use shrd::{Shared, SyncShared};

let alloc = TrackingAlloc::new();

let first: SyncShared<u32, &TrackingAlloc> = Shared::new_in(1, &alloc);
let second = first.clone();
drop(first);
assert_eq!(alloc.live(), 2);

drop(second);
assert_eq!(alloc.allocations(), 2);
assert_eq!(alloc.deallocations(), 2);
assert!(alloc.is_balanced());
```
*/

use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering::*};
use std::sync::Mutex;

use crate::alloc::{AllocError, Allocator, Global};

#[derive(Debug, Default)]
pub struct TrackingAlloc {
    live: Mutex<HashMap<usize, Layout>>,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    double_frees: AtomicUsize,
    budget: Mutex<Option<usize>>,
}

/// Give zero-sized requests a real block, so each allocation has its own address
fn backing(layout: Layout) -> Layout {
    if layout.size() != 0 {
        return layout;
    }
    // SAFETY: Size equals the (valid, power of two) alignment
    unsafe { Layout::from_size_align_unchecked(layout.align(), layout.align()) }
}

impl TrackingAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `n` allocations succeed, and fail every one after that
    pub fn fail_after(&self, n: usize) {
        *self.budget.lock().unwrap() = Some(n);
    }

    /// Stop failing allocations
    pub fn never_fail(&self) {
        *self.budget.lock().unwrap() = None;
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(SeqCst)
    }

    pub fn deallocations(&self) -> usize {
        self.deallocations.load(SeqCst)
    }

    /// Number of blocks handed out and not yet returned (aka leaked, once everything is dropped)
    pub fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn double_frees(&self) -> usize {
        self.double_frees.load(SeqCst)
    }

    /// Every block has been returned exactly once
    pub fn is_balanced(&self) -> bool {
        self.live() == 0 && self.double_frees() == 0
    }

    fn take_budget(&self) -> Result<(), AllocError> {
        let mut budget = self.budget.lock().unwrap();
        match budget.as_mut() {
            Some(0) => Err(AllocError),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

unsafe impl Allocator for TrackingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if let Err(err) = self.take_budget() {
            log::debug!("refusing allocation of {layout:?}");
            return Err(err);
        }

        let ptr = Global.allocate(backing(layout))?;
        self.live
            .lock()
            .unwrap()
            .insert(ptr.as_ptr() as usize, layout);
        self.allocations.fetch_add(1, SeqCst);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let Some(recorded) = self.live.lock().unwrap().remove(&(ptr.as_ptr() as usize)) else {
            log::error!("double free of {:p} ({layout:?})", ptr);
            self.double_frees.fetch_add(1, SeqCst);
            return;
        };

        debug_assert_eq!(recorded, layout, "block freed with a different layout");
        self.deallocations.fetch_add(1, SeqCst);
        Global.deallocate(ptr, backing(layout));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced() {
        let alloc = TrackingAlloc::new();
        let layout = Layout::new::<[u64; 4]>();

        let a = alloc.allocate(layout).unwrap();
        let b = alloc.allocate(layout).unwrap();
        assert_eq!(alloc.live(), 2);

        unsafe { alloc.deallocate(a, layout) };
        unsafe { alloc.deallocate(b, layout) };
        assert_eq!(alloc.allocations(), 2);
        assert_eq!(alloc.deallocations(), 2);
        assert!(alloc.is_balanced());
    }

    #[test]
    fn double_free() {
        let alloc = TrackingAlloc::new();
        let layout = Layout::new::<u32>();

        let ptr = alloc.allocate(layout).unwrap();
        unsafe { alloc.deallocate(ptr, layout) };
        unsafe { alloc.deallocate(ptr, layout) };

        assert_eq!(alloc.double_frees(), 1);
        assert_eq!(alloc.deallocations(), 1);
        assert!(!alloc.is_balanced());
    }

    #[test]
    fn zero_sized_blocks_are_distinct() {
        let alloc = TrackingAlloc::new();
        let layout = Layout::new::<()>();

        let a = alloc.allocate(layout).unwrap();
        let b = alloc.allocate(layout).unwrap();
        assert_ne!(a, b);
        assert_eq!(alloc.live(), 2);

        unsafe { alloc.deallocate(a, layout) };
        unsafe { alloc.deallocate(b, layout) };
        assert!(alloc.is_balanced());
    }

    #[test]
    fn budget() {
        let alloc = TrackingAlloc::new();
        let layout = Layout::new::<u8>();

        alloc.fail_after(1);
        let ptr = alloc.allocate(layout).unwrap();
        assert_eq!(alloc.allocate(layout), Err(AllocError));

        alloc.never_fail();
        let other = alloc.allocate(layout).unwrap();

        unsafe { alloc.deallocate(ptr, layout) };
        unsafe { alloc.deallocate(other, layout) };
        assert!(alloc.is_balanced());
    }
}
