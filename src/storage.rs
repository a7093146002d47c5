/// Storage areas and the lock-guarded persistence layer
///
/// `StorageArea` mirrors `chrome.storage.local` / `chrome.storage.sync`:
/// async get/set/remove over JSON values. `Store` wraps an area with a
/// `LockManager` so every read-modify-write is serialized per key.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::lock::LockManager;
use crate::tab_data::{IndexedTab, Tab};

pub const SAVED_TABS_KEY: &str = "savedTabs";
pub const TOTAL_TABS_REMOVED_KEY: &str = "totalTabsRemoved";
pub const TOTAL_TABS_UNWRANGLED_KEY: &str = "totalTabsUnwrangled";
pub const TOTAL_TABS_WRANGLED_KEY: &str = "totalTabsWrangled";
pub const TAB_TIMES_KEY: &str = "tabTimes";

/// Lock name guarding the saved list and its counters
const LOCAL_STATE_LOCK: &str = "persist:localState";

/// Soft budget for the serialized size of one saved tab
pub const AVERAGE_SAVED_TAB_BYTES: usize = 600;

pub type StorageItems = Map<String, Value>;

/// One key's change, as delivered by `chrome.storage.onChanged`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

pub type StorageChanges = HashMap<String, StorageChange>;

/// An async key-value storage area
#[allow(async_fn_in_trait)]
pub trait StorageArea {
    /// Fetch the given keys; absent keys are omitted from the result
    async fn get(&self, keys: &[&str]) -> Result<StorageItems, StorageError>;

    /// Write all items in one call
    async fn set(&self, items: StorageItems) -> Result<(), StorageError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;
}

type ChangeListener = Rc<dyn Fn(&StorageChanges)>;

#[derive(Default)]
struct MemoryInner {
    items: StorageItems,
    writes: usize,
    fail_with: Option<String>,
    listeners: Vec<ChangeListener>,
}

/// In-process storage area
///
/// Clones share the same items, so two `Store`s built from clones behave like
/// two execution contexts over one browser storage area.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for change notifications after each write
    pub fn on_changed(&self, listener: impl Fn(&StorageChanges) + 'static) {
        self.inner.borrow_mut().listeners.push(Rc::new(listener));
    }

    /// Number of `set`/`remove` calls that reached the area
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }

    /// Make every following call fail with `message`, or succeed again with `None`
    pub fn set_failure(&self, message: Option<&str>) {
        self.inner.borrow_mut().fail_with = message.map(str::to_string);
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        match &self.inner.borrow().fail_with {
            Some(message) => Err(StorageError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn notify(&self, changes: StorageChanges) {
        if changes.is_empty() {
            return;
        }
        // Listeners may read the area again; release the borrow first
        let listeners = self.inner.borrow().listeners.clone();
        for listener in listeners {
            listener(&changes);
        }
    }
}

impl StorageArea for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageItems, StorageError> {
        self.check_failure()?;
        let inner = self.inner.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| inner.items.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: StorageItems) -> Result<(), StorageError> {
        self.check_failure()?;
        let mut changes = StorageChanges::new();
        {
            let mut inner = self.inner.borrow_mut();
            inner.writes += 1;
            for (key, value) in items {
                let old_value = inner.items.insert(key.clone(), value.clone());
                if old_value.as_ref() != Some(&value) {
                    changes.insert(key, StorageChange { old_value, new_value: Some(value) });
                }
            }
        }
        self.notify(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.check_failure()?;
        let mut changes = StorageChanges::new();
        {
            let mut inner = self.inner.borrow_mut();
            inner.writes += 1;
            for key in keys {
                if let Some(old_value) = inner.items.remove(*key) {
                    changes.insert(key.to_string(), StorageChange { old_value: Some(old_value), new_value: None });
                }
            }
        }
        self.notify(changes);
        Ok(())
    }
}

/// Saved list plus counters, persisted together in the local area
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    #[serde(default)]
    pub saved_tabs: Vec<Tab>,
    #[serde(default)]
    pub total_tabs_removed: u64,
    #[serde(default)]
    pub total_tabs_unwrangled: u64,
    #[serde(default)]
    pub total_tabs_wrangled: u64,
}

impl LocalState {
    pub const KEYS: [&'static str; 4] = [
        SAVED_TABS_KEY,
        TOTAL_TABS_REMOVED_KEY,
        TOTAL_TABS_UNWRANGLED_KEY,
        TOTAL_TABS_WRANGLED_KEY,
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every saved entry matching one of `tabs`
    ///
    /// Returns the removed entries with the positions they held, so
    /// `insert_at_indices` can put them back.
    pub fn remove_saved_tabs(&mut self, tabs: &[Tab]) -> Vec<IndexedTab> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.saved_tabs)
            .into_iter()
            .enumerate()
            .partition(|(_, saved)| tabs.iter().any(|tab| tab.same_saved_tab(saved)));
        self.saved_tabs = kept.into_iter().map(|(_, tab)| tab).collect();
        removed
            .into_iter()
            .map(|(index, tab)| IndexedTab { index, tab })
            .collect()
    }

    /// Drop the oldest entries beyond `max_tabs`
    pub fn trim(&mut self, max_tabs: usize) {
        self.saved_tabs.truncate(max_tabs);
    }

    pub fn from_items(items: StorageItems) -> Result<Self, StorageError> {
        serde_json::from_value(Value::Object(items)).map_err(|e| StorageError::Serialization {
            key: SAVED_TABS_KEY.to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_items(&self) -> Result<StorageItems, StorageError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(items)) => Ok(items),
            Ok(other) => Err(StorageError::Serialization {
                key: SAVED_TABS_KEY.to_string(),
                message: format!("expected an object, got {other}"),
            }),
            Err(e) => Err(StorageError::Serialization {
                key: SAVED_TABS_KEY.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Average serialized size of the saved tabs, in bytes
pub fn average_saved_tab_bytes(tabs: &[Tab]) -> usize {
    if tabs.is_empty() {
        return 0;
    }
    let total: usize = tabs
        .iter()
        .filter_map(|tab| serde_json::to_string(tab).ok())
        .map(|json| json.len())
        .sum();
    total / tabs.len()
}

/// Lock-guarded persistence over one storage area
pub struct Store<S> {
    area: S,
    locks: LockManager,
}

impl<S: StorageArea> Store<S> {
    pub fn new(area: S) -> Self {
        Store {
            area,
            locks: LockManager::new(),
        }
    }

    pub async fn load_state(&self) -> Result<LocalState, StorageError> {
        let items = self.area.get(&LocalState::KEYS).await?;
        LocalState::from_items(items)
    }

    /// Read the saved list and counters, apply `mutate`, and write them back in one `set`
    pub async fn mutate_state<F, T>(&self, mutate: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut LocalState) -> T,
    {
        self.locks
            .acquire(LOCAL_STATE_LOCK, || async {
                let mut state = self.load_state().await?;
                let result = mutate(&mut state);
                self.area.set(state.to_items()?).await?;
                Ok::<T, StorageError>(result)
            })
            .await
    }

    /// Overwrite the saved list and counters with a fully built state
    pub async fn replace_state(&self, state: &LocalState) -> Result<(), StorageError> {
        let items = state.to_items()?;
        self.locks
            .acquire(LOCAL_STATE_LOCK, || self.area.set(items))
            .await
    }

    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let mut items = self.area.get(&[key]).await?;
        match items.remove(key) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Serialization {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Locked read-modify-write of a single key, starting from `T::default()` when absent
    pub async fn mutate_value<T, F, R>(&self, key: &str, mutate: F) -> Result<R, StorageError>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> R,
    {
        self.locks
            .acquire(key, || async {
                let mut value: T = self.get_value(key).await?.unwrap_or_default();
                let result = mutate(&mut value);
                let json = serde_json::to_value(&value).map_err(|e| StorageError::Serialization {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
                let mut items = StorageItems::new();
                items.insert(key.to_string(), json);
                self.area.set(items).await?;
                Ok::<R, StorageError>(result)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn saved_tab(id: i32, url: &str, closed_at: i64) -> Tab {
        let mut tab = Tab::new(id, url, "Saved");
        tab.closed_at = Some(closed_at);
        tab
    }

    #[test]
    fn test_local_state_new() {
        let state = LocalState::new();
        assert!(state.saved_tabs.is_empty());
        assert_eq!(state.total_tabs_wrangled, 0);
    }

    #[test]
    fn test_remove_saved_tabs() {
        let mut state = LocalState::new();
        state.saved_tabs = vec![
            saved_tab(1, "https://a.com", 3),
            saved_tab(2, "https://b.com", 2),
            saved_tab(3, "https://c.com", 1),
        ];

        let removed = state.remove_saved_tabs(&[saved_tab(2, "https://b.com", 2)]);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].index, 1);
        assert_eq!(state.saved_tabs.len(), 2);
        assert_eq!(state.saved_tabs[1].url, "https://c.com");
    }

    #[test]
    fn test_remove_nonexistent_saved_tab() {
        let mut state = LocalState::new();
        state.saved_tabs = vec![saved_tab(1, "https://a.com", 3)];

        let removed = state.remove_saved_tabs(&[saved_tab(1, "https://a.com", 4)]);

        assert!(removed.is_empty());
        assert_eq!(state.saved_tabs.len(), 1);
    }

    #[test]
    fn test_local_state_items_use_storage_keys() {
        let mut state = LocalState::new();
        state.total_tabs_wrangled = 7;
        let items = state.to_items().unwrap();

        for key in LocalState::KEYS {
            assert!(items.contains_key(key), "missing {key}");
        }
        assert_eq!(items[TOTAL_TABS_WRANGLED_KEY], json!(7));
    }

    #[test]
    fn test_mutate_state_writes_once() {
        let area = MemoryStorage::new();
        let store = Store::new(area.clone());

        let count = block_on(store.mutate_state(|state| {
            state.saved_tabs.push(saved_tab(1, "https://a.com", 1));
            state.total_tabs_wrangled += 1;
            state.saved_tabs.len()
        }))
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(area.write_count(), 1);
        let reloaded = block_on(store.load_state()).unwrap();
        assert_eq!(reloaded.total_tabs_wrangled, 1);
        assert_eq!(reloaded.saved_tabs[0].url, "https://a.com");
    }

    #[test]
    fn test_mutate_value_defaults_when_absent() {
        let store = Store::new(MemoryStorage::new());

        block_on(store.mutate_value(TAB_TIMES_KEY, |times: &mut HashMap<i32, i64>| {
            times.insert(9, 1000);
        }))
        .unwrap();

        let times: HashMap<i32, i64> = block_on(store.get_value(TAB_TIMES_KEY)).unwrap().unwrap();
        assert_eq!(times.get(&9), Some(&1000));
    }

    #[test]
    fn test_backend_failure_rejects() {
        let area = MemoryStorage::new();
        area.set_failure(Some("QUOTA_BYTES quota exceeded"));
        let store = Store::new(area.clone());

        let result = block_on(store.mutate_state(|state| state.total_tabs_removed += 1));

        assert_eq!(result, Err(StorageError::Backend("QUOTA_BYTES quota exceeded".to_string())));
        assert_eq!(area.write_count(), 0);
    }

    #[test]
    fn test_change_listener_sees_old_and_new() {
        let area = MemoryStorage::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        area.on_changed(move |changes| {
            let mut keys: Vec<String> = changes.keys().cloned().collect();
            keys.sort();
            sink.borrow_mut().extend(keys);
        });

        let mut items = StorageItems::new();
        items.insert("paused".to_string(), json!(true));
        block_on(area.set(items.clone())).unwrap();
        // Same value again produces no change event
        block_on(area.set(items)).unwrap();
        block_on(area.remove(&["paused"])).unwrap();

        assert_eq!(*seen.borrow(), vec!["paused".to_string(), "paused".to_string()]);
    }

    #[test]
    fn test_average_saved_tab_bytes() {
        assert_eq!(average_saved_tab_bytes(&[]), 0);
        let tabs = vec![saved_tab(1, "https://a.com", 1)];
        let expected = serde_json::to_string(&tabs[0]).unwrap().len();
        assert_eq!(average_saved_tab_bytes(&tabs), expected);
    }
}
