#![allow(unused_macros)]

/// Helper macro for locking items, propagating poisoning as [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(my_rwlock);
///  println!("{}", data.some_field);
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(my_rwlock);
///  data.some_field = 42;
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for waiting on a condition variable with a held guard
///
/// ```rust, ignore
///  guard = wait!(self.cond, guard);
/// ```
macro_rules! wait {
    ($condvar:expr, $guard:expr) => {
        $condvar.wait($guard).map_err(|_| crate::Error::LockError)?
    };
}
