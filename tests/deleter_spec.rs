use core::ffi::c_void;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;

use mcom::{ComImpl, ComObject, ComRc, IUnknownRaw, IUnknownVtbl, WeakComObject};

static DROP_COUNT: AtomicU32 = AtomicU32::new(0);
static TEST_LOCK: Mutex<()> = Mutex::new(());
static RECYCLED: Mutex<Vec<usize>> = Mutex::new(Vec::new());

struct Pooled(u32);

impl ComImpl for Pooled {}

impl Drop for Pooled {
    fn drop(&mut self) {
        DROP_COUNT.fetch_add(1, Ordering::Relaxed);
    }
}

type PlainObject = ComObject<Pooled, IUnknownVtbl>;
type WeakObject = WeakComObject<Pooled, IUnknownVtbl>;

unsafe fn recycle_plain(this: *mut c_void) {
    RECYCLED.lock().unwrap().push(this as usize);
    unsafe { PlainObject::destroy(this) };
}

unsafe fn recycle_weak(this: *mut c_void) {
    RECYCLED.lock().unwrap().push(this as usize);
    unsafe { WeakObject::destroy(this) };
}

fn reset() {
    DROP_COUNT.store(0, Ordering::Relaxed);
    RECYCLED.lock().unwrap().clear();
}

#[test]
fn deleter_receives_object_address_once() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset();

    let raw = PlainObject::new_with_deleter(Pooled(1), recycle_plain).unwrap();
    let strong = unsafe { ComRc::<IUnknownRaw>::from_raw(raw as *mut IUnknownRaw) }.unwrap();
    let copy = strong.clone();

    drop(strong);
    assert!(RECYCLED.lock().unwrap().is_empty());
    drop(copy);

    assert_eq!(*RECYCLED.lock().unwrap(), vec![raw as usize]);
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
}

#[test]
fn deleter_runs_on_the_releasing_thread() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset();

    let raw = PlainObject::new_with_deleter(Pooled(2), recycle_plain).unwrap();
    let strong = unsafe { ComRc::<IUnknownRaw>::from_raw(raw as *mut IUnknownRaw) }.unwrap();

    thread::spawn(move || drop(strong)).join().unwrap();

    assert_eq!(*RECYCLED.lock().unwrap(), vec![raw as usize]);
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
}

#[test]
fn weak_object_deleter_runs_at_payload_teardown() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset();

    let raw = WeakObject::new_with_deleter(Pooled(3), recycle_weak).unwrap();
    assert_eq!(unsafe { WeakObject::from_ptr(raw) }.inner_ref().0, 3);
    let strong = unsafe { ComRc::<IUnknownRaw>::from_raw(raw as *mut IUnknownRaw) }.unwrap();
    let weak = strong.downgrade().unwrap();

    drop(strong);
    assert_eq!(*RECYCLED.lock().unwrap(), vec![raw as usize]);
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);

    // The token survives the deleter.
    assert!(weak.is_expired());
    assert!(weak.upgrade().is_none());
}

#[test]
fn objects_without_deleter_destroy_normally() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset();

    let plain: ComRc<IUnknownRaw> = PlainObject::new_rc(Pooled(4)).unwrap();
    let weak: ComRc<IUnknownRaw> = WeakObject::new_rc(Pooled(5)).unwrap();
    drop(plain);
    drop(weak);

    assert!(RECYCLED.lock().unwrap().is_empty());
    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 2);
}
