/*!
Shared ownership of a single heap value through reference-counted handles.

A [`Shared`] is one member of an *ownership group*: the set of live handles that
jointly own one allocated value. Cloning a handle joins its group, dropping or
resetting a handle leaves it, and the value is released exactly once, when the
last handle of the group goes away.

```
use shrd::Shared;

let h1: Shared<i32> = Shared::new(10);
assert_eq!(h1.use_count(), 1);

let h2 = Shared::clone(&h1);
assert_eq!(h1.use_count(), 2);
assert_eq!(*h1, *h2);

drop(h2);
assert_eq!(h1.use_count(), 1);
```

Handles can also be empty, which is what [`Shared::default`] gives you. An empty
handle owns nothing and counts nothing:

```
use shrd::Shared;

let empty: Shared<String> = Shared::default();
assert!(empty.is_empty());
assert_eq!(empty.use_count(), 0);
assert!(empty.try_get().is_err());
```

# Counters

How the group counts its members is a type parameter implementing [`Count`]:

* [`LocalCount`] (the default) uses plain cells. Handles using it are neither
  [`Send`] nor [`Sync`], so the compiler stops them from crossing threads.
* [`AtomicCount`] uses atomics, releasing the value with a single
  decrement-and-test. Use the [`SyncShared`] alias for this.

# Allocators

Both the value and the counter block are obtained from an [`Allocator`], which
defaults to [`Global`]. The [`TrackingAlloc`](tracking::TrackingAlloc) mock records
every allocation so tests can check for leaks and double frees:

```
use shrd::tracking::TrackingAlloc;
use shrd::{LocalShared, Shared};

let alloc = TrackingAlloc::new();
{
    let a: LocalShared<_, &TrackingAlloc> = Shared::new_in([1, 2, 3], &alloc);
    let _b = a.clone();
    assert_eq!(alloc.live(), 2); // value + counter
}
assert!(alloc.is_balanced());
```
*/

pub mod alloc;
pub mod core;
pub mod error;
pub mod shared;
pub mod tracking;
pub mod weak;

mod ptr;

pub use crate::alloc::{AllocError, Allocator, Global};
pub use crate::core::{AtomicCount, Count, LocalCount};
pub use crate::error::{Error, Result};
pub use crate::shared::Shared;
pub use crate::weak::Weak;

/// Single-threaded handle with the global allocator
pub type LocalShared<T, A = Global> = Shared<T, LocalCount, A>;

/// Thread-safe handle with the global allocator
pub type SyncShared<T, A = Global> = Shared<T, AtomicCount, A>;

/// Weak counterpart of [`LocalShared`]
pub type LocalWeak<T, A = Global> = Weak<T, LocalCount, A>;

/// Weak counterpart of [`SyncShared`]
pub type SyncWeak<T, A = Global> = Weak<T, AtomicCount, A>;

pub(crate) mod sync {
    #[cfg(loom)]
    pub(crate) use loom::{
        hint::spin_loop,
        sync::atomic::{fence, AtomicUsize, Ordering},
    };

    #[cfg(not(loom))]
    pub(crate) use std::{
        hint::spin_loop,
        sync::atomic::{fence, AtomicUsize, Ordering},
    };
}
