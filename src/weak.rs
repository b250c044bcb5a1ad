use std::fmt;

use crate::alloc::{Allocator, Global};
use crate::core::{Count, LocalCount};
use crate::ptr::RawShared;
use crate::shared::Shared;

/**
A non-owning observer of an ownership group

A `Weak` does not keep the value alive, only the counter block. It can be
[`upgrade`](Weak::upgrade)d to a [`Shared`] for as long as the group still has a
strong member; after that, upgrading gives `None`.

```
# use shrd::{Shared, Weak};
let strong: Shared<_> = Shared::new(String::from("observed"));
let weak = Shared::downgrade(&strong);

{
    let upgraded = weak.upgrade().unwrap();
    assert_eq!(*upgraded, "observed");
    assert_eq!(weak.strong_count(), 2);
}

drop(strong);
assert_eq!(weak.strong_count(), 0);
assert!(weak.upgrade().is_none());
```
*/
pub struct Weak<T: ?Sized, C: Count = LocalCount, A: Allocator = Global> {
    raw: Option<RawShared<T, C, A>>,
}

impl<T: ?Sized, C: Count, A: Allocator> Weak<T, C, A> {
    /// A weak handle observing no group, which never upgrades
    pub const fn new() -> Self {
        Weak { raw: None }
    }

    pub(crate) fn from_raw_shared(raw: Option<RawShared<T, C, A>>) -> Self {
        Weak { raw }
    }

    /**
    Promote to a strong handle, if the value is still alive

    The check and the increment are one step, so a group whose last strong
    handle is being dropped concurrently is never brought back.
    */
    pub fn upgrade(&self) -> Option<Shared<T, C, A>> {
        let raw = self.raw?;
        if !raw.counts().try_inc_strong() {
            return None;
        }
        Some(Shared::from_raw_shared(Some(raw)))
    }

    /// Number of strong handles in the observed group
    pub fn strong_count(&self) -> usize {
        self.raw.as_ref().map_or(0, |raw| raw.counts().strong())
    }

    /// Number of weak handles observing the group (zero once the value is gone)
    pub fn weak_count(&self) -> usize {
        let Some(raw) = &self.raw else {
            return 0;
        };

        let counts = raw.counts();
        match counts.strong() {
            0 => 0,
            // Not counting the one held by the strong handles
            _ => counts.weak() - 1,
        }
    }

    /// Both handles observe the same group (or neither observes any)
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.raw.map(|raw| raw.addr()) == other.raw.map(|raw| raw.addr())
    }
}

// SAFETY: Same requirements as for `Shared`, which a `Weak` can turn into
unsafe impl<T, C, A> Send for Weak<T, C, A>
where
    T: ?Sized + Send + Sync,
    C: Count + Send + Sync,
    A: Allocator + Send + Sync,
{
}

unsafe impl<T, C, A> Sync for Weak<T, C, A>
where
    T: ?Sized + Send + Sync,
    C: Count + Send + Sync,
    A: Allocator + Send + Sync,
{
}

impl<T: ?Sized, C: Count, A: Allocator> Clone for Weak<T, C, A> {
    fn clone(&self) -> Self {
        if let Some(raw) = &self.raw {
            raw.counts().inc_weak();
        }
        Weak { raw: self.raw }
    }
}

impl<T: ?Sized, C: Count, A: Allocator> Drop for Weak<T, C, A> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: This handle gives up its weak membership and forgets the pair
            unsafe { raw.release_weak() };
        }
    }
}

impl<T: ?Sized, C: Count, A: Allocator> Default for Weak<T, C, A> {
    fn default() -> Self {
        Weak::new()
    }
}

impl<T: ?Sized, C: Count, A: Allocator> fmt::Debug for Weak<T, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some(_) => f.write_str("(Weak)"),
            None => f.write_str("<empty>"),
        }
    }
}
