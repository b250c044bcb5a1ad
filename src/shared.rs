use std::alloc::{handle_alloc_error, Layout};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use crate::alloc::{self, Allocator, Global};
use crate::core::{Count, LocalCount};
use crate::error::{Error, Result};
use crate::ptr::RawShared;
use crate::weak::Weak;

/**
One member of a group of handles jointly owning a single heap value

See the [crate-level documentation](crate) for more details.

An empty handle (from [`Shared::empty`], [`Shared::take`] or [`Shared::reset`])
owns nothing. Accessing its value through [`Deref`] panics with
[`Error::NullAccess`]; use [`Shared::try_get`] or [`Shared::get`] to handle it.
*/
pub struct Shared<T: ?Sized, C: Count = LocalCount, A: Allocator = Global> {
    raw: Option<RawShared<T, C, A>>,
    marker: PhantomData<T>,
}

impl<T, C: Count> Shared<T, C, Global> {
    /**
    Construct a new group owning `value`, with this handle as its only member

    ```
    # use shrd::Shared;
    let shared: Shared<_> = Shared::new(5);
    assert_eq!(*shared, 5);
    assert_eq!(shared.use_count(), 1);
    ```
    */
    pub fn new(value: T) -> Self {
        Shared::new_in(value, Global)
    }

    /// Leave the current group (if any), then own `value` in a new group
    pub fn reset_with(&mut self, value: T) {
        self.reset_in(value, Global);
    }
}

impl<T, C: Count, A: Allocator> Shared<T, C, A> {
    /// Construct a new group owning `value`, with memory from `alloc`
    ///
    /// Aborts through [`handle_alloc_error`] if the allocation fails.
    pub fn new_in(value: T, alloc: A) -> Self {
        Shared::allocate_in(value, alloc).unwrap_or_else(|layout| handle_alloc_error(layout))
    }

    /**
    Construct a new group owning `value`, reporting allocation failure

    On failure `value` is dropped, and nothing is leaked.

    ```
    # use shrd::{Error, LocalShared, Shared};
    # use shrd::tracking::TrackingAlloc;
    let alloc = TrackingAlloc::new();
    alloc.fail_after(1);

    let result: Result<LocalShared<_, _>, _> = Shared::try_new_in(String::from("big"), &alloc);
    assert!(matches!(result, Err(Error::Alloc { .. })));
    assert!(alloc.is_balanced());
    ```
    */
    pub fn try_new_in(value: T, alloc: A) -> Result<Self> {
        Shared::allocate_in(value, alloc).map_err(Error::alloc)
    }

    fn allocate_in(value: T, alloc: A) -> Result<Self, Layout> {
        let value = alloc::allocate(&alloc, value)?;

        // SAFETY: The value was just allocated by `alloc`, and is owned by nobody else
        let raw = unsafe { RawShared::adopt(value, alloc) }?;
        Ok(Shared::from_raw_shared(Some(raw)))
    }

    /// Leave the current group (if any), then own `value` in a new group from `alloc`
    pub fn reset_in(&mut self, value: T, alloc: A) {
        self.reset();
        *self = Shared::new_in(value, alloc);
    }

    /**
    Raw pointer to the value, or null if the handle is empty

    The pointer does not count as a member of the group: it must not outlive the
    group, and must never be used to free the value.

    ```
    # use shrd::Shared;
    let shared: Shared<_> = Shared::new(1);
    assert!(!shared.as_ptr().is_null());
    assert!(Shared::<i32>::empty().as_ptr().is_null());
    ```
    */
    pub fn as_ptr(&self) -> *const T {
        match &self.raw {
            Some(raw) => raw.value_ptr().as_ptr(),
            None => std::ptr::null(),
        }
    }

    /**
    Take the value out, if this is the only handle in its group

    Weak handles do not prevent this, but can no longer be upgraded afterwards.
    If there are other strong handles (or this one is empty) the handle is given back.

    ```
    # use shrd::Shared;
    let a: Shared<_> = Shared::new(String::from("mine"));
    let b = a.clone();

    let a = Shared::try_unwrap(a).unwrap_err();
    drop(b);
    assert_eq!(Shared::try_unwrap(a).unwrap(), "mine");
    ```
    */
    pub fn try_unwrap(mut this: Self) -> Result<T, Self> {
        match this.raw {
            Some(raw) if raw.counts().try_unique() => {
                this.raw = None;
                // SAFETY: We just took the strong count from one to zero
                Ok(unsafe { raw.into_value() })
            }
            _ => Err(this),
        }
    }
}

impl<T, C: Count, A: Allocator> Shared<[T], C, A> {
    /// Construct a new group owning the elements of `vec`, as one array allocation from `alloc`
    pub fn from_vec_in(vec: Vec<T>, alloc: A) -> Self {
        Shared::allocate_vec_in(vec, alloc).unwrap_or_else(|layout| handle_alloc_error(layout))
    }

    pub fn try_from_vec_in(vec: Vec<T>, alloc: A) -> Result<Self> {
        Shared::allocate_vec_in(vec, alloc).map_err(Error::alloc)
    }

    fn allocate_vec_in(vec: Vec<T>, alloc: A) -> Result<Self, Layout> {
        let value = alloc::allocate_slice(&alloc, vec)?;

        // SAFETY: The array was just allocated by `alloc`, and is owned by nobody else
        let raw = unsafe { RawShared::adopt(value, alloc) }?;
        Ok(Shared::from_raw_shared(Some(raw)))
    }
}

impl<T: ?Sized, C: Count, A: Allocator> Shared<T, C, A> {
    /**
    Construct an empty handle

    No memory is allocated, and dropping it does nothing.

    ```
    # use shrd::Shared;
    let empty = Shared::<u8>::empty();
    assert!(empty.is_empty());
    assert_eq!(empty.use_count(), 0);
    ```
    */
    pub const fn empty() -> Self {
        Shared {
            raw: None,
            marker: PhantomData,
        }
    }

    /**
    Take ownership of a value that the caller allocated through `alloc`

    A null `ptr` gives an empty handle (and drops `alloc`).

    # Safety
    - `ptr` must point to a live value allocated by `alloc` with [`Layout::for_value`](std::alloc::Layout::for_value)
    - The caller gives up the value: it must not free it, use it afterwards, or hand it to another handle
    */
    pub unsafe fn from_raw_in(ptr: *mut T, alloc: A) -> Self {
        let Some(value) = std::ptr::NonNull::new(ptr) else {
            return Shared::empty();
        };

        match RawShared::adopt(value, alloc) {
            Ok(raw) => Shared::from_raw_shared(Some(raw)),
            Err(layout) => handle_alloc_error(layout),
        }
    }

    pub(crate) fn from_raw_shared(raw: Option<RawShared<T, C, A>>) -> Self {
        Shared {
            raw,
            marker: PhantomData,
        }
    }

    pub fn is_some(&self) -> bool {
        self.raw.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Number of handles in this group (zero for an empty handle)
    pub fn use_count(&self) -> usize {
        self.raw.as_ref().map_or(0, |raw| raw.counts().strong())
    }

    /// Number of [`Weak`] handles observing this group
    pub fn weak_count(&self) -> usize {
        // The strong handles hold one weak reference between them
        self.raw.as_ref().map_or(0, |raw| raw.counts().weak() - 1)
    }

    /// The value, or `None` if the handle is empty
    pub fn get(&self) -> Option<&T> {
        // SAFETY: We are a strong member of the group, so the value is alive
        self.raw.as_ref().map(|raw| unsafe { raw.value() })
    }

    /**
    The value, or [`Error::NullAccess`] if the handle is empty

    ```
    # use shrd::{Error, Shared};
    let shared: Shared<_> = Shared::new([1, 2, 3]);
    assert_eq!(shared.try_get(), Ok(&[1, 2, 3]));

    let empty = Shared::<[i32; 3]>::empty();
    assert_eq!(empty.try_get(), Err(Error::NullAccess));
    ```
    */
    pub fn try_get(&self) -> Result<&T> {
        self.get().ok_or(Error::NullAccess)
    }

    /// The value, without checking for an empty handle
    ///
    /// # Safety
    /// The handle must not be empty
    pub unsafe fn get_unchecked(&self) -> &T {
        debug_assert!(self.is_some(), "get_unchecked on an empty handle");
        self.raw.as_ref().unwrap_unchecked().value()
    }

    /**
    Mutable access to the value, if this is the only handle observing it (strong or weak)

    ```
    # use shrd::Shared;
    let mut shared: Shared<_> = Shared::new(1);
    *shared.get_mut().unwrap() += 1;

    let other = shared.clone();
    assert!(shared.get_mut().is_none());
    assert_eq!(*other, 2);
    ```
    */
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let raw = self.raw.as_ref()?;
        if !raw.counts().is_unique() {
            return None;
        }

        // SAFETY: No other handle can reach the value, and we hold `self` mutably
        Some(unsafe { &mut *raw.value_ptr().as_ptr() })
    }

    /// The allocator of this group, or `None` if the handle is empty
    pub fn allocator(&self) -> Option<&A> {
        self.raw.as_ref().map(RawShared::allocator)
    }

    /**
    Leave the group, leaving this handle empty

    The value is released if this was the last handle in the group.

    ```
    # use shrd::Shared;
    let mut a: Shared<_> = Shared::new("value");
    let b = a.clone();

    a.reset();
    assert!(a.is_empty());
    assert_eq!(b.use_count(), 1);
    ```
    */
    pub fn reset(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: This handle gives up its membership and forgets the pair
            unsafe { raw.release() };
        }
    }

    /**
    Make this handle a member of `other`'s group

    The current group is left first (releasing its value if this was the last
    member). If both handles already belong to the same group nothing changes,
    which is what makes assigning a handle to an alias of itself safe.
    Assigning an empty handle makes this one empty.

    ```
    # use shrd::Shared;
    let a: Shared<_> = Shared::new(1);
    let mut b: Shared<_> = Shared::new(2);

    b.assign(&a);
    assert_eq!(*b, 1);
    assert_eq!(a.use_count(), 2);
    assert!(Shared::ptr_eq(&a, &b));
    ```
    */
    pub fn assign(&mut self, other: &Self) {
        if Shared::ptr_eq(self, other) {
            return;
        }

        self.reset();
        if let Some(raw) = other.raw {
            raw.join();
            self.raw = Some(raw);
        }
    }

    /**
    Move this handle's membership out, leaving it empty

    The counts are untouched: the returned handle takes this one's place.

    ```
    # use shrd::Shared;
    let mut a: Shared<_> = Shared::new(1);
    let b = a.take();

    assert!(a.is_empty());
    assert_eq!(a.use_count(), 0);
    assert_eq!(b.use_count(), 1);
    ```
    */
    pub fn take(&mut self) -> Self {
        Shared::from_raw_shared(self.raw.take())
    }

    /// Leave the current group, then take over `other`'s membership (leaving it empty)
    pub fn move_from(&mut self, other: &mut Self) {
        let incoming = other.take();
        self.reset();
        *self = incoming;
    }

    /// Both handles belong to the same group (or are both empty)
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.raw.map(|raw| raw.addr()) == other.raw.map(|raw| raw.addr())
    }

    /**
    Create a [`Weak`] handle observing this group

    An empty handle gives an empty weak handle.

    ```
    # use shrd::Shared;
    let shared: Shared<_> = Shared::new(3);
    let weak = Shared::downgrade(&shared);
    assert_eq!(shared.weak_count(), 1);

    assert_eq!(weak.upgrade().as_deref(), Some(&3));
    drop(shared);
    assert!(weak.upgrade().is_none());
    ```
    */
    pub fn downgrade(this: &Self) -> Weak<T, C, A> {
        if let Some(raw) = this.raw {
            raw.counts().inc_weak();
        }
        Weak::from_raw_shared(this.raw)
    }
}

// -------------------------------------

// SAFETY: Handles in one group may live on different threads, so every part of
// the group must be safe to share. `LocalCount` is not `Sync`, which keeps
// single-threaded groups on their thread.
unsafe impl<T, C, A> Send for Shared<T, C, A>
where
    T: ?Sized + Send + Sync,
    C: Count + Send + Sync,
    A: Allocator + Send + Sync,
{
}

unsafe impl<T, C, A> Sync for Shared<T, C, A>
where
    T: ?Sized + Send + Sync,
    C: Count + Send + Sync,
    A: Allocator + Send + Sync,
{
}

impl<T: ?Sized, C: Count, A: Allocator> Clone for Shared<T, C, A> {
    fn clone(&self) -> Self {
        if let Some(raw) = &self.raw {
            raw.join();
        }
        Shared::from_raw_shared(self.raw)
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T: ?Sized, C: Count, A: Allocator> Drop for Shared<T, C, A> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, C: Count, A: Allocator> Default for Shared<T, C, A> {
    fn default() -> Self {
        Shared::empty()
    }
}

impl<T: ?Sized, C: Count, A: Allocator> Deref for Shared<T, C, A> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: ?Sized, C: Count> From<Box<T>> for Shared<T, C, Global> {
    fn from(boxed: Box<T>) -> Self {
        // SAFETY: Box allocates through the global heap with the value's layout
        unsafe { Shared::from_raw_in(Box::into_raw(boxed), Global) }
    }
}

impl<T, C: Count> From<Vec<T>> for Shared<[T], C, Global> {
    fn from(vec: Vec<T>) -> Self {
        Shared::from_vec_in(vec, Global)
    }
}

impl<T: Clone, C: Count> From<&[T]> for Shared<[T], C, Global> {
    fn from(slice: &[T]) -> Self {
        Shared::from_vec_in(slice.to_vec(), Global)
    }
}

impl<T: ?Sized + fmt::Debug, C: Count, A: Allocator> fmt::Debug for Shared<T, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("<empty>"),
        }
    }
}

impl<T: ?Sized, C: Count, A: Allocator> fmt::Pointer for Shared<T, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw) => fmt::Pointer::fmt(&raw.value_ptr(), f),
            None => fmt::Pointer::fmt(&std::ptr::null::<u8>(), f),
        }
    }
}

impl<T: ?Sized + PartialEq, C: Count, A: Allocator> PartialEq for Shared<T, C, A> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: ?Sized + Eq, C: Count, A: Allocator> Eq for Shared<T, C, A> {}

impl<T: ?Sized + PartialOrd, C: Count, A: Allocator> PartialOrd for Shared<T, C, A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.get().partial_cmp(&other.get())
    }
}

impl<T: ?Sized + Ord, C: Count, A: Allocator> Ord for Shared<T, C, A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().cmp(&other.get())
    }
}

impl<T: ?Sized + Hash, C: Count, A: Allocator> Hash for Shared<T, C, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get().hash(state);
    }
}
