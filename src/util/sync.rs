//! Lock acquisition that survives poisoning.
//!
//! A panic while holding one of these locks leaves plain data behind (maps of sessions or
//! channel senders), so continuing with the inner value is preferable to cascading the panic.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            owner,
            op,
            lock_kind = "rwlock.read",
            "Recovered from poisoned lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn write_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            owner,
            op,
            lock_kind = "rwlock.write",
            "Recovered from poisoned lock"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_lock_still_yields_inner_value() {
        let lock = RwLock::new(vec![1, 2, 3]);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock should be acquired");
            panic!("poison the lock");
        }));

        assert!(lock.is_poisoned());
        write_or_recover(&lock, "tests", "push").push(4);
        assert_eq!(*read_or_recover(&lock, "tests", "read"), vec![1, 2, 3, 4]);
    }
}
