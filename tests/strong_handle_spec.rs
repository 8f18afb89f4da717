use core::alloc::Layout;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

use mcom::{
    Allocator, ComImpl, ComObject, ComRc, ComSlot, ComWrapper, IUnknownRaw, IUnknownVtbl, Status,
};

static DROP_COUNT: AtomicU32 = AtomicU32::new(0);
static TEST_LOCK: Mutex<()> = Mutex::new(());

struct Dummy;

impl ComImpl for Dummy {}

impl Drop for Dummy {
    fn drop(&mut self) {
        DROP_COUNT.fetch_add(1, Ordering::Relaxed);
    }
}

type DummyObject = ComObject<Dummy, IUnknownVtbl>;

struct Exhausted;

impl Allocator for Exhausted {
    unsafe fn alloc(&self, _layout: Layout) -> *mut u8 {
        core::ptr::null_mut()
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}

fn new_unknown() -> ComRc<IUnknownRaw> {
    DummyObject::new_rc(Dummy).unwrap()
}

#[test]
fn comrc_many_clones_drop_once() {
    let _guard = TEST_LOCK.lock().unwrap();
    DROP_COUNT.store(0, Ordering::Relaxed);
    let raw = DummyObject::new(Dummy).unwrap();

    let com = unsafe { ComRc::<IUnknownRaw>::from_raw_addref(raw as *mut IUnknownRaw).unwrap() };
    let clones: Vec<_> = (0..8).map(|_| com.clone()).collect();
    assert_eq!(com.ref_count(), 10);
    drop(com);
    drop(clones);

    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);

    unsafe {
        assert_eq!(DummyObject::shim_release(raw), 0);
    }

    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
}

#[test]
fn copy_then_drop_restores_count() {
    let _guard = TEST_LOCK.lock().unwrap();
    DROP_COUNT.store(0, Ordering::Relaxed);
    let x = new_unknown();

    let a = unsafe { ComRc::from_raw_addref(x.as_ptr()).unwrap() };
    let b = a.clone();
    assert_eq!(x.ref_count(), 3);

    drop(a);
    drop(b);
    assert_eq!(x.ref_count(), 1);
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);
}

#[test]
fn move_out_of_slot_leaves_it_empty() {
    let _guard = TEST_LOCK.lock().unwrap();
    let x = new_unknown();

    let mut a = Some(x.clone());
    let c = a.take();
    assert!(a.is_none());
    assert_eq!(x.ref_count(), 2);
    assert!(unsafe { *a.read_slot() }.is_null());

    drop(c);
    assert_eq!(x.ref_count(), 1);
}

#[test]
fn aliasing_assignment_never_reaches_zero() {
    let _guard = TEST_LOCK.lock().unwrap();
    DROP_COUNT.store(0, Ordering::Relaxed);
    let mut a = new_unknown();

    for _ in 0..4 {
        let alias = a.clone();
        a.assign(&alias);
        drop(alias);
        a = a.clone();
    }

    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);
    assert_eq!(a.ref_count(), 1);
    drop(a);
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
}

#[test]
fn concurrent_retain_release_destroys_once() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let _guard = TEST_LOCK.lock().unwrap();
    for _ in 0..16 {
        DROP_COUNT.store(0, Ordering::Relaxed);
        let root = new_unknown();
        let barrier = Barrier::new(THREADS);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                let mine = root.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        let extra = mine.clone();
                        drop(extra);
                    }
                    drop(mine);
                });
            }
        });

        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);
        assert_eq!(root.ref_count(), 1);
        drop(root);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }
}

#[test]
fn last_release_on_other_thread_destroys_once() {
    let _guard = TEST_LOCK.lock().unwrap();
    for _ in 0..64 {
        DROP_COUNT.store(0, Ordering::Relaxed);
        let root = new_unknown();
        let handles: Vec<_> = (0..4).map(|_| root.clone()).collect();
        drop(root);

        thread::scope(|scope| {
            for handle in handles {
                scope.spawn(move || drop(handle));
            }
        });

        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }
}

#[test]
fn allocation_failure_is_a_status() {
    let _guard = TEST_LOCK.lock().unwrap();
    DROP_COUNT.store(0, Ordering::Relaxed);

    let err = ComObject::<Dummy, IUnknownVtbl, Exhausted>::new_in(Dummy, Exhausted).unwrap_err();
    assert_eq!(err, Status::OUT_OF_MEMORY);
    assert!(ComObject::<Dummy, IUnknownVtbl, Exhausted>::try_new_in(Dummy, Exhausted).is_none());
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 2);
}
