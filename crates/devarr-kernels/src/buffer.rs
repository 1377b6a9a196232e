//! Reference-counted device buffers and the allocator that creates them.
//!
//! A [`DeviceBuffer`] is a counted handle to one contiguous device allocation.
//! Every live handle accounts for exactly one count; the handle that takes the
//! count from 1 to 0 frees the allocation, passing the full byte size it was
//! created with. Array views hold handles, so the allocation lives as long as
//! the longest-lived view.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::driver::{ContextId, DevicePtr, Driver};
use crate::emulated::EmulatedDriver;
use crate::{DeviceError, Result};

/// Who is responsible for freeing a buffer's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Memory belongs to someone else; this layer never frees it.
    Borrowed,
    /// Hand ownership of foreign memory to this layer. Not supported.
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Allocated,
    Foreign,
}

struct BufferCore {
    ptr: DevicePtr,
    nbytes: usize,
    context: ContextId,
    origin: Origin,
    refs: AtomicUsize,
    driver: Arc<dyn Driver>,
}

impl BufferCore {
    /// Returns whether the buffer was already live.
    fn retain(&self) -> bool {
        self.refs.fetch_add(1, Ordering::AcqRel) > 0
    }

    /// Returns true iff this call dropped the count to zero.
    fn release(&self) -> bool {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release on a dead buffer");
        prev == 1
    }

    fn free(&self) {
        if self.origin == Origin::Foreign || self.ptr.is_null() {
            return;
        }
        match self.driver.dealloc(self.ptr, self.nbytes) {
            Ok(()) => tracing::debug!(
                "freed {} bytes at {} on {}",
                self.nbytes,
                self.ptr,
                self.context
            ),
            Err(e) => tracing::warn!(
                "failed to free {} bytes at {} on {}: {}",
                self.nbytes,
                self.ptr,
                self.context,
                e
            ),
        }
    }
}

/// Counted handle to a device allocation.
///
/// `Clone` retains, `Drop` releases. Handles may be sent across threads; the
/// count is atomic, the buffer contents are not protected.
pub struct DeviceBuffer {
    core: Arc<BufferCore>,
    // Set once `release` has given up this handle's count.
    released: bool,
}

impl DeviceBuffer {
    fn from_core(core: BufferCore) -> Self {
        Self {
            core: Arc::new(core),
            released: false,
        }
    }

    /// Take another count on this buffer.
    pub fn retain(&self) -> DeviceBuffer {
        let live = self.core.retain();
        debug_assert!(live, "retain on a dead buffer");
        DeviceBuffer {
            core: Arc::clone(&self.core),
            released: false,
        }
    }

    /// Give up this handle's count. Returns true iff this call freed the
    /// device memory.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.give_up_count()
    }

    fn give_up_count(&self) -> bool {
        let last = self.core.release();
        if last {
            self.core.free();
        }
        last
    }

    /// Base device address.
    pub fn ptr(&self) -> DevicePtr {
        self.core.ptr
    }

    /// Size of the whole allocation in bytes.
    pub fn len(&self) -> usize {
        self.core.nbytes
    }

    /// Whether the allocation is zero bytes long.
    pub fn is_empty(&self) -> bool {
        self.core.nbytes == 0
    }

    /// Context that owns the allocation.
    pub fn context(&self) -> ContextId {
        self.core.context
    }

    /// Driver the allocation came from.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.core.driver
    }

    /// Allocator for the same driver, used to create sibling buffers.
    pub fn allocator(&self) -> Allocator {
        Allocator::new(Arc::clone(&self.core.driver))
    }

    /// Whether this buffer wraps memory owned outside this layer.
    pub fn is_foreign(&self) -> bool {
        self.core.origin == Origin::Foreign
    }

    /// Current reference count (includes the permanent count of foreign buffers).
    pub fn ref_count(&self) -> usize {
        self.core.refs.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same allocation.
    pub fn same_buffer(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Validate that `[offset, offset + nbytes)` lies within the allocation.
    pub fn check_range(&self, offset: usize, nbytes: usize, what: &str) -> Result<()> {
        let end = offset.checked_add(nbytes).ok_or_else(|| {
            DeviceError::Transfer(format!("{what}: byte range overflows ({offset} + {nbytes})"))
        })?;
        if end > self.core.nbytes {
            return Err(DeviceError::Transfer(format!(
                "{what}: bytes {offset}..{end} exceed buffer of {} bytes",
                self.core.nbytes
            )));
        }
        Ok(())
    }
}

impl Clone for DeviceBuffer {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if !self.released {
            self.give_up_count();
        }
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &self.core.ptr)
            .field("nbytes", &self.core.nbytes)
            .field("context", &self.core.context)
            .field("foreign", &self.is_foreign())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Creates device buffers for one driver context.
#[derive(Debug, Clone)]
pub struct Allocator {
    driver: Arc<dyn Driver>,
}

impl Allocator {
    /// Allocator backed by `driver`.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Allocator over a fresh emulated device without a memory limit.
    pub fn emulated() -> Self {
        Self::new(Arc::new(EmulatedDriver::new()))
    }

    /// Allocator over the CUDA device with the given ordinal.
    #[cfg(feature = "cuda")]
    pub fn cuda(device_idx: usize) -> Result<Self> {
        Ok(Self::new(Arc::new(crate::cuda::CudaDriver::new(device_idx)?)))
    }

    /// The driver this allocator uses.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Context of buffers created here.
    pub fn context(&self) -> ContextId {
        self.driver.context()
    }

    /// Allocate `nbytes` of device memory with a reference count of one.
    ///
    /// Zero-length requests never reach the driver and yield a null buffer.
    pub fn allocate(&self, nbytes: usize) -> Result<DeviceBuffer> {
        let ptr = if nbytes == 0 {
            DevicePtr::NULL
        } else {
            self.driver.alloc(nbytes)?
        };
        tracing::debug!(
            "allocated {} bytes at {} on {}",
            nbytes,
            ptr,
            self.driver.context()
        );
        Ok(DeviceBuffer::from_core(BufferCore {
            ptr,
            nbytes,
            context: self.driver.context(),
            origin: Origin::Allocated,
            refs: AtomicUsize::new(1),
            driver: Arc::clone(&self.driver),
        }))
    }

    /// Wrap memory this layer did not allocate.
    ///
    /// The count starts one higher than the number of handles, so releasing
    /// every handle never frees it. Requesting [`Ownership::Transfer`] fails.
    pub fn wrap_foreign(
        &self,
        ptr: DevicePtr,
        nbytes: usize,
        ownership: Ownership,
    ) -> Result<DeviceBuffer> {
        if ownership == Ownership::Transfer {
            return Err(DeviceError::UnsupportedOperation(
                "taking ownership of foreign device memory".into(),
            ));
        }
        tracing::debug!(
            "wrapped {} foreign bytes at {} on {}",
            nbytes,
            ptr,
            self.driver.context()
        );
        Ok(DeviceBuffer::from_core(BufferCore {
            ptr,
            nbytes,
            context: self.driver.context(),
            origin: Origin::Foreign,
            refs: AtomicUsize::new(2),
            driver: Arc::clone(&self.driver),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Collects formatted log output for the duration of a test.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn with_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs.contents())
    }

    fn setup() -> (Arc<EmulatedDriver>, Allocator) {
        let driver = Arc::new(EmulatedDriver::new());
        let alloc = Allocator::new(driver.clone());
        (driver, alloc)
    }

    #[test]
    fn test_allocate_and_drop() {
        let (driver, alloc) = setup();
        let buf = alloc.allocate(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(buf.ref_count(), 1);
        assert_eq!(driver.stats().live_allocations, 1);
        drop(buf);
        assert_eq!(driver.stats().deallocs, 1);
        assert_eq!(driver.stats().live_allocations, 0);
    }

    #[test]
    fn test_shared_handles_free_once() {
        let (driver, alloc) = setup();
        let a = alloc.allocate(32).unwrap();
        let b = a.clone();
        let c = b.retain();
        assert_eq!(a.ref_count(), 3);
        assert!(a.same_buffer(&c));

        assert!(!a.release());
        assert!(!c.release());
        assert_eq!(driver.stats().deallocs, 0);
        assert!(b.release());
        assert_eq!(driver.stats().deallocs, 1);
    }

    #[test]
    fn test_zero_length_skips_driver() {
        let (driver, alloc) = setup();
        let buf = alloc.allocate(0).unwrap();
        assert!(buf.ptr().is_null());
        assert!(buf.is_empty());
        drop(buf);
        let stats = driver.stats();
        assert_eq!(stats.allocs, 0);
        assert_eq!(stats.deallocs, 0);
    }

    #[test]
    fn test_out_of_memory() {
        let driver = Arc::new(EmulatedDriver::with_memory_limit(100));
        let alloc = Allocator::new(driver.clone());
        let err = alloc.allocate(101).unwrap_err();
        assert!(matches!(err, DeviceError::Allocation { nbytes: 101, .. }));
        assert_eq!(driver.stats().live_allocations, 0);
    }

    #[test]
    fn test_foreign_never_freed() {
        let (driver, alloc) = setup();
        let ptr = driver.register_foreign(128);
        let buf = alloc.wrap_foreign(ptr, 128, Ownership::Borrowed).unwrap();
        assert!(buf.is_foreign());
        assert_eq!(buf.ref_count(), 2);
        let other = buf.clone();
        assert!(!buf.release());
        assert!(!other.release());
        assert_eq!(driver.stats().deallocs, 0);
        assert!(driver.is_mapped(ptr));
    }

    #[test]
    fn test_foreign_ownership_transfer_rejected() {
        let (driver, alloc) = setup();
        let ptr = driver.register_foreign(16);
        let err = alloc.wrap_foreign(ptr, 16, Ownership::Transfer).unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_dealloc_failure_is_not_fatal() {
        let (driver, alloc) = setup();
        let buf = alloc.allocate(8).unwrap();
        driver.fail_deallocs(true);
        let (last, logs) = with_warnings(|| buf.release());
        assert!(last);
        assert_eq!(driver.stats().live_allocations, 1);
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("failed to free 8 bytes"), "{logs}");
    }

    #[test]
    fn test_successful_free_logs_no_warning() {
        let (driver, alloc) = setup();
        let buf = alloc.allocate(8).unwrap();
        let ((), logs) = with_warnings(|| drop(buf));
        assert_eq!(driver.stats().deallocs, 1);
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn test_release_gives_up_exactly_one_count() {
        let (driver, alloc) = setup();
        let a = alloc.allocate(16).unwrap();
        let b = a.clone();
        assert!(!b.release());
        assert_eq!(a.ref_count(), 1);
        assert_eq!(driver.stats().deallocs, 0);

        let c = a.retain();
        drop(a);
        assert!(c.release());
        let stats = driver.stats();
        assert_eq!(stats.deallocs, 1);
        assert_eq!(stats.live_allocations, 0);
    }

    #[test]
    fn test_check_range() {
        let (_driver, alloc) = setup();
        let buf = alloc.allocate(16).unwrap();
        assert!(buf.check_range(0, 16, "t").is_ok());
        assert!(buf.check_range(16, 0, "t").is_ok());
        assert!(matches!(buf.check_range(8, 9, "t"), Err(DeviceError::Transfer(_))));
        assert!(matches!(
            buf.check_range(usize::MAX, 2, "t"),
            Err(DeviceError::Transfer(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_freed_exactly_when_counts_balance(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let (driver, alloc) = setup();
            let mut handles = vec![alloc.allocate(4).unwrap()];
            for retain in ops {
                if retain || handles.len() == 1 {
                    let h = handles[0].retain();
                    handles.push(h);
                } else {
                    let h = handles.pop().unwrap();
                    prop_assert!(!h.release());
                }
                prop_assert_eq!(driver.stats().deallocs, 0);
                prop_assert_eq!(handles[0].ref_count(), handles.len());
            }
            while handles.len() > 1 {
                let h = handles.pop().unwrap();
                prop_assert!(!h.release());
            }
            prop_assert_eq!(driver.stats().deallocs, 0);
            let last = handles.pop().unwrap();
            prop_assert!(last.release());
            prop_assert_eq!(driver.stats().deallocs, 1);
        }
    }
}
