use std::cell::Cell;

use crate::sync::{fence, spin_loop, AtomicUsize, Ordering::*};

/// Counts above this are treated as a leak in progress and abort the process
const MAX_COUNT: usize = isize::MAX as usize;

/// Weak count while `AtomicCount::is_unique` is checking the strong count
const LOCKED: usize = usize::MAX;

#[cold]
fn overflow() -> ! {
    log::error!("reference count overflowed, aborting");
    std::process::abort()
}

/**
The counter block shared by every handle in one ownership group

A block holds two counts:
- `strong`: the number of live [`Shared`](crate::Shared) handles
- `weak`: the number of live [`Weak`](crate::Weak) handles, plus one implicit
  weak reference held collectively by the strong handles

Both counts start at one. The value is released when `strong` drops to zero,
and the block itself when `weak` does.

# Safety
Implementations must make each `dec_*` a single decrement-and-test: exactly one
caller may ever observe the transition to zero. `try_inc_strong` must never move
the strong count away from zero.
*/
pub unsafe trait Count {
    /// A fresh block for a group with one strong member
    fn new() -> Self
    where
        Self: Sized;

    fn strong(&self) -> usize;

    fn weak(&self) -> usize;

    fn inc_strong(&self);

    /// Returns `true` if this was the last strong reference
    fn dec_strong(&self) -> bool;

    /// Increment the strong count, unless it already reached zero
    fn try_inc_strong(&self) -> bool;

    /// Take the strong count from one to zero, if there is exactly one strong reference
    fn try_unique(&self) -> bool;

    /// Exactly one strong reference and no weak ones, observed as a single step
    ///
    /// A `true` answer stays true for as long as the caller holds that one strong
    /// reference exclusively, since no weak reference can be made from it meanwhile.
    fn is_unique(&self) -> bool;

    fn inc_weak(&self);

    /// Returns `true` if this was the last weak reference
    fn dec_weak(&self) -> bool;
}

// -------------------------------------

/// Non-atomic counters, for handles that stay on a single thread
#[derive(Debug)]
pub struct LocalCount {
    strong: Cell<usize>,
    weak: Cell<usize>,
}

fn increment(cell: &Cell<usize>) {
    let n = cell.get();
    if n >= MAX_COUNT {
        overflow();
    }
    cell.set(n + 1);
}

fn decrement(cell: &Cell<usize>) -> bool {
    let n = cell.get();
    debug_assert_ne!(n, 0, "decremented a count that was already zero");
    cell.set(n - 1);
    n == 1
}

unsafe impl Count for LocalCount {
    fn new() -> Self {
        Self {
            strong: Cell::new(1),
            weak: Cell::new(1),
        }
    }

    fn strong(&self) -> usize {
        self.strong.get()
    }

    fn weak(&self) -> usize {
        self.weak.get()
    }

    fn inc_strong(&self) {
        increment(&self.strong);
    }

    fn dec_strong(&self) -> bool {
        decrement(&self.strong)
    }

    fn try_inc_strong(&self) -> bool {
        if self.strong.get() == 0 {
            return false;
        }
        increment(&self.strong);
        true
    }

    fn try_unique(&self) -> bool {
        if self.strong.get() != 1 {
            return false;
        }
        self.strong.set(0);
        true
    }

    fn is_unique(&self) -> bool {
        self.strong.get() == 1 && self.weak.get() == 1
    }

    fn inc_weak(&self) {
        increment(&self.weak);
    }

    fn dec_weak(&self) -> bool {
        decrement(&self.weak)
    }
}

// -------------------------------------

/// Atomic counters, for handles shared across threads
#[derive(Debug)]
pub struct AtomicCount {
    strong: AtomicUsize,
    weak: AtomicUsize,
}

unsafe impl Count for AtomicCount {
    fn new() -> Self {
        Self {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
        }
    }

    fn strong(&self) -> usize {
        self.strong.load(Acquire)
    }

    fn weak(&self) -> usize {
        match self.weak.load(Acquire) {
            // Only taken when the implicit weak reference is the last one
            LOCKED => 1,
            n => n,
        }
    }

    fn inc_strong(&self) {
        // New references can only be made from existing ones, so no ordering is needed here
        if self.strong.fetch_add(1, Relaxed) >= MAX_COUNT {
            overflow();
        }
    }

    fn dec_strong(&self) -> bool {
        if self.strong.fetch_sub(1, Release) != 1 {
            return false;
        }

        // Every use of the value by other handles happens-before its release
        fence(Acquire);
        true
    }

    fn try_inc_strong(&self) -> bool {
        let mut current = self.strong.load(Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            if current >= MAX_COUNT {
                overflow();
            }
            match self
                .strong
                .compare_exchange_weak(current, current + 1, Acquire, Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn try_unique(&self) -> bool {
        self.strong.compare_exchange(1, 0, Acquire, Relaxed).is_ok()
    }

    fn is_unique(&self) -> bool {
        // Lock the weak count so no weak reference can be made (or upgraded and
        // then dropped) between the two checks
        if self.weak.compare_exchange(1, LOCKED, Acquire, Relaxed).is_err() {
            return false;
        }

        let unique = self.strong.load(Acquire) == 1;
        self.weak.store(1, Release);
        unique
    }

    fn inc_weak(&self) {
        let mut current = self.weak.load(Relaxed);
        loop {
            if current == LOCKED {
                spin_loop();
                current = self.weak.load(Relaxed);
                continue;
            }
            if current >= MAX_COUNT {
                overflow();
            }
            match self
                .weak
                .compare_exchange_weak(current, current + 1, Acquire, Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn dec_weak(&self) -> bool {
        if self.weak.fetch_sub(1, Release) != 1 {
            return false;
        }
        fence(Acquire);
        true
    }
}
