#![cfg(not(loom))]

use std::cell::Cell;

use shrd::tracking::TrackingAlloc;
use shrd::{Error, LocalShared, Shared};

type Tracked<'a, T> = LocalShared<T, &'a TrackingAlloc>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Droppable<'a>(&'a Cell<usize>);

impl Drop for Droppable<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn copy_and_destroy_scenario() {
    init_logger();
    let alloc = TrackingAlloc::new();

    let h1: Tracked<'_, i32> = Shared::new_in(10, &alloc);
    assert_eq!(h1.use_count(), 1);

    let h2 = h1.clone();
    assert_eq!(h1.use_count(), 2);
    assert_eq!(h2.use_count(), 2);
    assert_eq!(*h1, 10);
    assert_eq!(*h2, 10);

    drop(h2);
    assert_eq!(h1.use_count(), 1);

    drop(h1);
    assert_eq!(alloc.deallocations(), 2);
    assert!(alloc.is_balanced());
}

#[test]
fn default_handle_scenario() {
    let alloc = TrackingAlloc::new();
    let h: Tracked<'_, i32> = Shared::default();

    assert!(!h.is_some());
    assert_eq!(h.use_count(), 0);
    assert_eq!(h.try_get(), Err(Error::NullAccess));

    drop(h);
    assert_eq!(alloc.allocations(), 0);
    assert_eq!(alloc.deallocations(), 0);
}

/// Replays a fixed script of copies, moves, assignments and drops over a pool
/// of handles, checking after every step that each handle's `use_count` equals
/// the number of live handles sharing its value.
#[test]
fn use_count_tracks_membership() {
    init_logger();
    let drops = Cell::new(0);
    let alloc = TrackingAlloc::new();

    let mut pool: Vec<Tracked<'_, Droppable>> = vec![
        Shared::new_in(Droppable(&drops), &alloc),
        Shared::new_in(Droppable(&drops), &alloc),
        Shared::empty(),
        Shared::empty(),
        Shared::empty(),
    ];

    let check = |pool: &[Tracked<'_, Droppable>]| {
        for handle in pool {
            let members = pool.iter().filter(|h| h.is_some() && Shared::ptr_eq(h, handle)).count();
            assert_eq!(handle.use_count(), members);
        }
    };

    enum Step {
        Copy(usize, usize),
        Move(usize, usize),
        Reset(usize),
    }

    let script = [
        Step::Copy(2, 0),
        Step::Copy(3, 0),
        Step::Copy(4, 1),
        Step::Move(1, 4),
        Step::Copy(0, 1),
        Step::Copy(0, 0),
        Step::Reset(2),
        Step::Move(3, 3),
        Step::Copy(2, 4),
        Step::Move(2, 0),
        Step::Reset(1),
        Step::Reset(3),
    ];

    for step in script {
        match step {
            Step::Copy(to, from) => {
                let source = pool[from].clone();
                pool[to].assign(&source);
            }
            Step::Move(to, from) if to == from => {}
            Step::Move(to, from) => {
                let taken = pool[from].take();
                pool[to] = taken;
            }
            Step::Reset(at) => pool[at].reset(),
        }
        check(&pool);
    }

    // The first value went away with its last handle, in slot 3
    assert_eq!(drops.get(), 1);

    drop(pool);
    assert_eq!(drops.get(), 2);
    assert!(alloc.is_balanced());
}

#[test]
fn release_once_in_any_order() {
    for order in [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]] {
        let drops = Cell::new(0);
        let alloc = TrackingAlloc::new();

        let first: Tracked<'_, Droppable> = Shared::new_in(Droppable(&drops), &alloc);
        let mut handles: Vec<Option<_>> = vec![
            Some(first.clone()),
            Some(first.clone()),
            Some(first.clone()),
            Some(first),
        ];

        for (n, i) in order.into_iter().enumerate() {
            assert_eq!(drops.get(), 0);
            let handle = handles[i].take().unwrap();
            assert_eq!(handle.use_count(), 4 - n);
            drop(handle);
        }

        assert_eq!(drops.get(), 1);
        assert!(alloc.is_balanced());
    }
}

#[test]
fn moved_from_is_empty() {
    let mut source: Shared<_> = Shared::new(String::from("moving"));
    let target = source.take();
    assert!(!source.is_some());
    assert_eq!(source.use_count(), 0);
    assert_eq!(target.use_count(), 1);

    let mut other: Shared<_> = Shared::new(String::from("replaced"));
    let mut source = target;
    other.move_from(&mut source);
    assert!(source.is_empty());
    assert_eq!(source.use_count(), 0);
    assert_eq!(*other, "moving");
}

#[test]
fn assignment_between_groups() {
    let drops = Cell::new(0);
    let alloc = TrackingAlloc::new();

    let a: Tracked<'_, Droppable> = Shared::new_in(Droppable(&drops), &alloc);
    let a2 = a.clone();
    let mut b: Tracked<'_, Droppable> = Shared::new_in(Droppable(&drops), &alloc);

    b.assign(&a);
    assert_eq!(drops.get(), 1);
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(a.use_count(), 3);
    assert_eq!(a.use_count(), b.use_count());

    drop((a, a2, b));
    assert_eq!(drops.get(), 2);
    assert!(alloc.is_balanced());
}

#[test]
fn self_assignment() {
    let mut h: Shared<_> = Shared::new(vec![1, 2]);
    let before = h.use_count();

    let alias = h.clone();
    h.assign(&alias);
    drop(alias);

    assert_eq!(h.use_count(), before);
    assert_eq!(*h, [1, 2]);
}

#[test]
fn weak_handles_outlive_value() {
    let alloc = TrackingAlloc::new();
    let strong: Tracked<'_, [u8; 32]> = Shared::new_in([7; 32], &alloc);
    let weak = Shared::downgrade(&strong);

    assert_eq!(weak.upgrade().map(|s| s[0]), Some(7));
    drop(strong);

    assert!(weak.upgrade().is_none());
    assert_eq!(alloc.live(), 1);
    drop(weak);
    assert!(alloc.is_balanced());
}
