//! Last-accessed timestamps per tab.
//!
//! The map lives in the local storage area under `tabTimes`; every call is a
//! locked read-modify-write so the background and popup contexts share it.

use std::collections::HashMap;

use crate::error::StorageError;
use crate::storage::{StorageArea, Store, TAB_TIMES_KEY};

pub type TabTimeMap = HashMap<i32, i64>;

pub struct TabTimes<'a, S> {
    store: &'a Store<S>,
}

impl<'a, S: StorageArea> TabTimes<'a, S> {
    pub fn new(store: &'a Store<S>) -> Self {
        TabTimes { store }
    }

    /// Record `timestamp` (or `now`) as the tab's last access
    pub async fn update(&self, tab_id: i32, timestamp: Option<i64>, now: i64) -> Result<(), StorageError> {
        self.update_many(&[tab_id], timestamp, now).await
    }

    /// Stamp several tabs in one write
    pub async fn update_many(&self, tab_ids: &[i32], timestamp: Option<i64>, now: i64) -> Result<(), StorageError> {
        if tab_ids.is_empty() {
            return Ok(());
        }
        let time = timestamp.unwrap_or(now);
        self.store
            .mutate_value(TAB_TIMES_KEY, |times: &mut TabTimeMap| {
                for id in tab_ids {
                    times.insert(*id, time);
                }
            })
            .await
    }

    pub async fn remove(&self, tab_id: i32) -> Result<(), StorageError> {
        self.store
            .mutate_value(TAB_TIMES_KEY, |times: &mut TabTimeMap| {
                times.remove(&tab_id);
            })
            .await
    }

    /// Replace the whole map with `tab_ids` stamped `now`, dropping ids of closed tabs
    pub async fn reset(&self, tab_ids: &[i32], now: i64) -> Result<(), StorageError> {
        self.store
            .mutate_value(TAB_TIMES_KEY, |times: &mut TabTimeMap| {
                *times = tab_ids.iter().map(|id| (*id, now)).collect();
            })
            .await
    }

    pub async fn get(&self, tab_id: i32) -> Result<Option<i64>, StorageError> {
        Ok(self.all().await?.get(&tab_id).copied())
    }

    pub async fn all(&self) -> Result<TabTimeMap, StorageError> {
        Ok(self.store.get_value(TAB_TIMES_KEY).await?.unwrap_or_default())
    }

    /// Ids last accessed strictly before `cutoff`; every id when `cutoff` is `None`
    pub async fn older_than(&self, cutoff: Option<i64>) -> Result<Vec<i32>, StorageError> {
        let times = self.all().await?;
        Ok(times
            .into_iter()
            .filter(|(_, time)| cutoff.is_none_or(|cutoff| *time < cutoff))
            .map(|(id, _)| id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use futures::executor::block_on;

    #[test]
    fn test_update_defaults_to_now() {
        let store = Store::new(MemoryStorage::new());
        let times = TabTimes::new(&store);

        block_on(times.update(1, None, 5_000)).unwrap();
        block_on(times.update(2, Some(1_000), 5_000)).unwrap();

        assert_eq!(block_on(times.get(1)).unwrap(), Some(5_000));
        assert_eq!(block_on(times.get(2)).unwrap(), Some(1_000));
    }

    #[test]
    fn test_older_than_is_strict() {
        let store = Store::new(MemoryStorage::new());
        let times = TabTimes::new(&store);
        block_on(times.update(1, Some(100), 0)).unwrap();
        block_on(times.update(2, Some(200), 0)).unwrap();
        block_on(times.update(3, Some(300), 0)).unwrap();

        let mut older = block_on(times.older_than(Some(200))).unwrap();
        older.sort();
        assert_eq!(older, vec![1]);

        let mut all = block_on(times.older_than(None)).unwrap();
        all.sort();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn test_remove() {
        let store = Store::new(MemoryStorage::new());
        let times = TabTimes::new(&store);
        block_on(times.update_many(&[1, 2], None, 10)).unwrap();

        block_on(times.remove(1)).unwrap();

        assert_eq!(block_on(times.get(1)).unwrap(), None);
        assert_eq!(block_on(times.get(2)).unwrap(), Some(10));
    }

    #[test]
    fn test_reset_drops_stale_ids() {
        let store = Store::new(MemoryStorage::new());
        let times = TabTimes::new(&store);
        block_on(times.update_many(&[1, 2, 3], Some(1), 0)).unwrap();

        block_on(times.reset(&[2, 4], 99)).unwrap();

        let all = block_on(times.all()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get(&2), Some(&99));
        assert_eq!(all.get(&4), Some(&99));
    }

    #[test]
    fn test_shared_between_contexts() {
        let area = MemoryStorage::new();
        let background = Store::new(area.clone());
        let popup = Store::new(area);

        block_on(TabTimes::new(&popup).update(7, Some(42), 0)).unwrap();

        assert_eq!(block_on(TabTimes::new(&background).get(7)).unwrap(), Some(42));
    }
}
