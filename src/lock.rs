//! Advisory async mutex keyed by name.
//!
//! Serializes read-modify-write sequences on one storage key within a single
//! execution context. Two contexts holding separate `LockManager`s are not
//! serialized against each other.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use futures::lock::Mutex;

#[derive(Default)]
pub struct LockManager {
    locks: RefCell<HashMap<String, Rc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `critical_section` while holding the lock named `key`
    pub async fn acquire<F, Fut, T>(&self, key: &str, critical_section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mutex = self.lock_for(key);
        let _guard = mutex.lock().await;
        critical_section().await
    }

    fn lock_for(&self, key: &str) -> Rc<Mutex<()>> {
        self.locks
            .borrow_mut()
            .entry(key.to_string())
            .or_insert_with(|| Rc::new(Mutex::new(())))
            .clone()
    }
}
