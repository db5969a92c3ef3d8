//! Usage: `Mutex` extension that recovers from poisoning instead of propagating a panic.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Locks the mutex; a poisoned lock is logged and its inner data reused.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "mutex poisoned by a panicking holder; continuing with its last state"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn recovers_map_written_before_panic() {
        let windows: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let writer = Arc::clone(&windows);

        let _ = std::thread::spawn(move || {
            let mut guard = writer.lock().unwrap();
            guard.insert("GET /2/users/me".to_string(), 74);
            panic!("holder panicked");
        })
        .join();

        assert!(windows.is_poisoned());
        let guard = windows.lock_or_recover();
        assert_eq!(guard.get("GET /2/users/me"), Some(&74));
    }
}
