//! The per-thread current allocator.
//!
//! Constructors without an explicit allocator (`GpuArray::new`,
//! `GpuArray::filled`, ...) allocate on the current thread's allocator. It is
//! opened lazily from [`RuntimeConfig::from_env`] on first use and can be
//! replaced for the thread or overridden for a scope.

use std::cell::RefCell;

use devarr_kernels::Allocator;

use crate::config::RuntimeConfig;
use crate::Result;

thread_local! {
    static CURRENT: RefCell<Option<Allocator>> = const { RefCell::new(None) };
}

/// The current thread's allocator, opening it from the environment if unset.
pub fn current_allocator() -> Result<Allocator> {
    if let Some(alloc) = CURRENT.with(|c| c.borrow().clone()) {
        return Ok(alloc);
    }
    let alloc = RuntimeConfig::from_env()?.open()?;
    tracing::info!("default allocator for this thread: {}", alloc.context());
    CURRENT.with(|c| *c.borrow_mut() = Some(alloc.clone()));
    Ok(alloc)
}

/// Replace the current thread's allocator, returning the previous one.
pub fn set_current_allocator(alloc: Option<Allocator>) -> Option<Allocator> {
    CURRENT.with(|c| std::mem::replace(&mut *c.borrow_mut(), alloc))
}

/// Run `f` with `alloc` as the current allocator, restoring the previous one
/// afterwards (also on panic).
pub fn with_allocator<R>(alloc: &Allocator, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Allocator>);

    impl Drop for Restore {
        fn drop(&mut self) {
            set_current_allocator(self.0.take());
        }
    }

    let _restore = Restore(set_current_allocator(Some(alloc.clone())));
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_allocator_scopes() {
        let outer = Allocator::emulated();
        let inner = Allocator::emulated();
        let prev = set_current_allocator(Some(outer.clone()));

        with_allocator(&inner, || {
            assert_eq!(current_allocator().unwrap().context(), inner.context());
            with_allocator(&outer, || {
                assert_eq!(current_allocator().unwrap().context(), outer.context());
            });
            assert_eq!(current_allocator().unwrap().context(), inner.context());
        });
        assert_eq!(current_allocator().unwrap().context(), outer.context());

        set_current_allocator(prev);
    }

    #[test]
    fn test_restored_after_panic() {
        let outer = Allocator::emulated();
        let inner = Allocator::emulated();
        set_current_allocator(Some(outer.clone()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_allocator(&inner, || panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(current_allocator().unwrap().context(), outer.context());
    }

    #[test]
    fn test_set_returns_previous() {
        let a = Allocator::emulated();
        set_current_allocator(Some(a.clone()));
        let prev = set_current_allocator(None).unwrap();
        assert_eq!(prev.context(), a.context());
    }
}
