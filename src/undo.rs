//! Undo/redo for saved-list edits made from the popup.
//!
//! Lives only as long as the popup session that owns it. Both stacks hold at
//! most [`MAX_UNDO_ACTIONS`] entries; the oldest entry is dropped on overflow.

use std::cell::RefCell;
use std::collections::VecDeque;

use log::debug;

use crate::browser::Browser;
use crate::error::Result;
use crate::storage::StorageArea;
use crate::tab_data::{IndexedTab, Tab};
use crate::tab_manager::TabManager;

pub const MAX_UNDO_ACTIONS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum UndoableAction {
    /// Entries deleted from the saved list, with the positions they held
    Remove { tabs: Vec<IndexedTab> },
    /// Entries reopened in the browser, with the positions they held
    Restore { tabs: Vec<IndexedTab> },
}

#[derive(Debug, Default)]
pub struct UndoLog {
    past: RefCell<VecDeque<UndoableAction>>,
    future: RefCell<VecDeque<UndoableAction>>,
}

fn push_capped(stack: &RefCell<VecDeque<UndoableAction>>, action: UndoableAction) {
    let mut stack = stack.borrow_mut();
    stack.push_back(action);
    if stack.len() > MAX_UNDO_ACTIONS {
        stack.pop_front();
    }
}

fn plain_tabs(tabs: &[IndexedTab]) -> Vec<Tab> {
    tabs.iter().map(|indexed| indexed.tab.clone()).collect()
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.borrow().is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.borrow().is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.borrow().len()
    }

    pub fn future_len(&self) -> usize {
        self.future.borrow().len()
    }

    /// A new action starts a new branch of history
    fn record(&self, action: UndoableAction) {
        push_capped(&self.past, action);
        self.future.borrow_mut().clear();
    }

    /// Delete saved entries and remember where they were
    ///
    /// Only entries still on the saved list are recorded; a stale selection
    /// leaves nothing to undo.
    pub async fn remove_tabs<B, L, Y>(&self, manager: &TabManager<B, L, Y>, tabs: Vec<IndexedTab>) -> Result<()>
    where
        B: Browser,
        L: StorageArea,
        Y: StorageArea,
    {
        if tabs.is_empty() {
            return Ok(());
        }
        let removed = manager.remove_saved_tabs(&plain_tabs(&tabs)).await?;
        if !removed.is_empty() {
            self.record(UndoableAction::Remove { tabs: removed });
        }
        Ok(())
    }

    /// Reopen saved tabs and remember where they were in the saved list
    pub async fn restore_tabs<B, L, Y>(&self, manager: &TabManager<B, L, Y>, tabs: Vec<Tab>) -> Result<()>
    where
        B: Browser,
        L: StorageArea,
        Y: StorageArea,
    {
        if tabs.is_empty() {
            return Ok(());
        }
        let removed = manager.unwrangle_tabs(&tabs).await?;
        if !removed.is_empty() {
            self.record(UndoableAction::Restore { tabs: removed });
        }
        Ok(())
    }

    /// Revert the most recent action; returns false when there is nothing to undo
    pub async fn undo<B, L, Y>(&self, manager: &TabManager<B, L, Y>) -> Result<bool>
    where
        B: Browser,
        L: StorageArea,
        Y: StorageArea,
    {
        let Some(action) = self.past.borrow_mut().pop_back() else {
            return Ok(false);
        };
        let result = match &action {
            UndoableAction::Remove { tabs } => manager.reinsert_removed_tabs(tabs).await,
            // Reopened tabs stay open; only the saved list is reverted
            UndoableAction::Restore { tabs } => manager.reinsert_restored_tabs(tabs).await,
        };
        match result {
            Ok(()) => {
                debug!("Undid {:?}", action_name(&action));
                push_capped(&self.future, action);
                Ok(true)
            }
            Err(e) => {
                self.past.borrow_mut().push_back(action);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone action
    pub async fn redo<B, L, Y>(&self, manager: &TabManager<B, L, Y>) -> Result<bool>
    where
        B: Browser,
        L: StorageArea,
        Y: StorageArea,
    {
        let Some(action) = self.future.borrow_mut().pop_back() else {
            return Ok(false);
        };
        let result = match &action {
            UndoableAction::Remove { tabs } => manager.remove_saved_tabs(&plain_tabs(tabs)).await.map(|_| ()),
            UndoableAction::Restore { tabs } => manager.unwrangle_tabs(&plain_tabs(tabs)).await.map(|_| ()),
        };
        match result {
            Ok(()) => {
                debug!("Redid {:?}", action_name(&action));
                push_capped(&self.past, action);
                Ok(true)
            }
            Err(e) => {
                self.future.borrow_mut().push_back(action);
                Err(e)
            }
        }
    }

    /// Forget all history, as when the popup closes
    pub fn clear(&self) {
        self.past.borrow_mut().clear();
        self.future.borrow_mut().clear();
    }
}

fn action_name(action: &UndoableAction) -> &'static str {
    match action {
        UndoableAction::Remove { .. } => "remove",
        UndoableAction::Restore { .. } => "restore",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockBrowser;
    use crate::storage::MemoryStorage;
    use futures::executor::block_on;

    type TestManager = TabManager<MockBrowser, MemoryStorage, MemoryStorage>;

    fn manager_with_saved(count: i32) -> TestManager {
        let manager = TabManager::new(MockBrowser::default(), MemoryStorage::new(), MemoryStorage::new());
        let tabs: Vec<Tab> = (1..=count)
            .map(|id| Tab::new(id, &format!("https://{id}.example.com"), &format!("Tab {id}")))
            .collect();
        block_on(manager.wrangle_tabs_and_persist_at(&tabs, 1_000)).unwrap();
        manager
    }

    fn indexed(saved: &[Tab], indices: &[usize]) -> Vec<IndexedTab> {
        indices
            .iter()
            .map(|&index| IndexedTab { index, tab: saved[index].clone() })
            .collect()
    }

    #[test]
    fn test_remove_then_undo_is_identity() {
        let manager = manager_with_saved(6);
        let log = UndoLog::new();
        let before = block_on(manager.load_state()).unwrap();

        block_on(log.remove_tabs(&manager, indexed(&before.saved_tabs, &[4, 0, 2]))).unwrap();
        let after_remove = block_on(manager.load_state()).unwrap();
        assert_eq!(after_remove.saved_tabs.len(), 3);
        assert_eq!(after_remove.total_tabs_removed, 3);

        assert!(block_on(log.undo(&manager)).unwrap());

        let after_undo = block_on(manager.load_state()).unwrap();
        assert_eq!(after_undo, before);
        assert!(log.can_redo());
    }

    #[test]
    fn test_redo_reapplies_remove() {
        let manager = manager_with_saved(3);
        let log = UndoLog::new();
        let saved = block_on(manager.load_state()).unwrap().saved_tabs;

        block_on(log.remove_tabs(&manager, indexed(&saved, &[1]))).unwrap();
        block_on(log.undo(&manager)).unwrap();
        assert!(block_on(log.redo(&manager)).unwrap());

        let state = block_on(manager.load_state()).unwrap();
        assert_eq!(state.saved_tabs.len(), 2);
        assert!(!state.saved_tabs.contains(&saved[1]));
        assert!(log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn test_undo_restore_keeps_browser_tab_open() {
        let manager = manager_with_saved(3);
        let log = UndoLog::new();
        let before = block_on(manager.load_state()).unwrap();

        block_on(log.restore_tabs(&manager, vec![before.saved_tabs[1].clone()])).unwrap();
        assert_eq!(manager.browser().created.borrow().len(), 1);
        assert_eq!(block_on(manager.load_state()).unwrap().saved_tabs.len(), 2);

        block_on(log.undo(&manager)).unwrap();

        assert_eq!(block_on(manager.load_state()).unwrap(), before);
        // Nothing was closed again
        let closes = manager.browser().removed.borrow().len();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_new_action_clears_future() {
        let manager = manager_with_saved(3);
        let log = UndoLog::new();
        let saved = block_on(manager.load_state()).unwrap().saved_tabs;

        block_on(log.remove_tabs(&manager, indexed(&saved, &[0]))).unwrap();
        block_on(log.undo(&manager)).unwrap();
        assert!(log.can_redo());

        let saved = block_on(manager.load_state()).unwrap().saved_tabs;
        block_on(log.remove_tabs(&manager, indexed(&saved, &[2]))).unwrap();

        assert!(!log.can_redo());
    }

    #[test]
    fn test_stacks_are_capped() {
        let manager = manager_with_saved(MAX_UNDO_ACTIONS as i32 + 5);
        let log = UndoLog::new();

        for _ in 0..MAX_UNDO_ACTIONS + 5 {
            let saved = block_on(manager.load_state()).unwrap().saved_tabs;
            block_on(log.remove_tabs(&manager, indexed(&saved, &[0]))).unwrap();
        }

        assert_eq!(log.past_len(), MAX_UNDO_ACTIONS);
    }

    #[test]
    fn test_undo_with_empty_history() {
        let manager = manager_with_saved(1);
        let log = UndoLog::new();

        assert!(!block_on(log.undo(&manager)).unwrap());
        assert!(!block_on(log.redo(&manager)).unwrap());
    }

    #[test]
    fn test_undo_restore_of_unsaved_tab_changes_nothing() {
        let manager = manager_with_saved(1);
        let log = UndoLog::new();
        let before = block_on(manager.load_state()).unwrap();

        let gone = Tab::new(99, "https://gone.com", "Gone");
        block_on(log.restore_tabs(&manager, vec![gone])).unwrap();

        assert!(!log.can_undo());
        assert!(!block_on(log.undo(&manager)).unwrap());
        assert_eq!(block_on(manager.load_state()).unwrap(), before);
    }

    #[test]
    fn test_undo_restore_reverts_only_found_entries() {
        let manager = manager_with_saved(2);
        let log = UndoLog::new();
        let before = block_on(manager.load_state()).unwrap();

        let batch = vec![before.saved_tabs[1].clone(), Tab::new(99, "https://gone.com", "Gone")];
        block_on(log.restore_tabs(&manager, batch)).unwrap();
        assert_eq!(block_on(manager.load_state()).unwrap().total_tabs_unwrangled, 1);

        assert!(block_on(log.undo(&manager)).unwrap());
        assert_eq!(block_on(manager.load_state()).unwrap(), before);
    }

    #[test]
    fn test_undo_remove_of_stale_selection_keeps_counter() {
        let manager = manager_with_saved(2);
        let log = UndoLog::new();
        let saved = block_on(manager.load_state()).unwrap().saved_tabs;

        let stale = IndexedTab { index: 0, tab: Tab::new(99, "https://gone.com", "Gone") };
        let batch = vec![IndexedTab { index: 1, tab: saved[1].clone() }, stale];
        block_on(log.remove_tabs(&manager, batch)).unwrap();
        assert_eq!(block_on(manager.load_state()).unwrap().total_tabs_removed, 1);

        block_on(log.undo(&manager)).unwrap();

        let state = block_on(manager.load_state()).unwrap();
        assert_eq!(state.saved_tabs, saved);
        assert_eq!(state.total_tabs_removed, 0);
    }
}
