//! Synchronization utilities for lock poisoning
//!
//! Converts poisoned `Mutex`/`RwLock` results into domain errors so a panic
//! in one task surfaces as an error to callers instead of cascading panics.

use std::sync::{LockResult, RwLockReadGuard, RwLockWriteGuard};

/// Map a poisoned mutex lock into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use queuestream::core::sync::handle_mutex_poison;
/// use queuestream::queue::QueueError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(mutex.lock(), |message| {
///     QueueError::Synchronisation { message }
/// })
/// .unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (mutex poisoned). A task panicked while holding a lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Map a poisoned RwLock read into an application error
pub fn handle_rwlock_read<T, E>(
    result: LockResult<RwLockReadGuard<T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (RwLock read poisoned). A task panicked while holding a write lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Map a poisoned RwLock write into an application error
pub fn handle_rwlock_write<T, E>(
    result: LockResult<RwLockWriteGuard<T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (RwLock write poisoned). A task panicked while holding the lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex, RwLock};
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct TestError {
        message: String,
    }

    #[test]
    fn test_handle_mutex_poison_success() {
        let mutex = Mutex::new(7);
        let result = handle_mutex_poison(mutex.lock(), |message| TestError { message });

        assert_eq!(*result.unwrap(), 7);
    }

    #[test]
    fn test_handle_mutex_poison_with_poisoned_mutex() {
        let mutex = Arc::new(Mutex::new(0));
        let mutex_clone = Arc::clone(&mutex);

        let _ = thread::spawn(move || {
            let _guard = mutex_clone.lock().unwrap();
            panic!("poison the gate");
        })
        .join();

        let error = handle_mutex_poison(mutex.lock(), |message| TestError { message })
            .unwrap_err();
        assert!(error.message.contains("mutex poisoned"));
    }

    #[test]
    fn test_handle_rwlock_write_then_read() {
        let rwlock = RwLock::new(1);

        *handle_rwlock_write(rwlock.write(), |message| TestError { message }).unwrap() = 2;
        let value = handle_rwlock_read(rwlock.read(), |message| TestError { message }).unwrap();

        assert_eq!(*value, 2);
    }
}
