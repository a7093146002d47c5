//! The wrangling engine.
//!
//! One `TabManager` is built per execution context (background or popup) and
//! handed to everything that needs settings, tab times, or the saved list.
//! Contexts only see each other through the storage areas.

use std::future::Future;
use std::str::FromStr;

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::browser::Browser;
use crate::domain::extract_root_domain;
use crate::error::{Result, SettingsError};
use crate::operations::{group_tabs, insert_at_indices, plan_closures, wrangle_into};
use crate::settings::{SettingEffect, SettingKey, SettingsStore};
use crate::storage::{average_saved_tab_bytes, LocalState, StorageArea, Store, AVERAGE_SAVED_TAB_BYTES};
use crate::tab_data::{IndexedTab, Tab};
use crate::tab_times::TabTimes;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Actions offered from the tab context menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    LockTab,
    LockDomain,
    WrangleTab,
}

impl MenuAction {
    pub fn id(self) -> &'static str {
        match self {
            MenuAction::LockTab => "lockTab",
            MenuAction::LockDomain => "lockDomain",
            MenuAction::WrangleTab => "wrangleTab",
        }
    }
}

impl FromStr for MenuAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lockTab" => Ok(MenuAction::LockTab),
            "lockDomain" => Ok(MenuAction::LockDomain),
            "wrangleTab" => Ok(MenuAction::WrangleTab),
            other => Err(format!("Unknown menu item '{other}'")),
        }
    }
}

pub struct TabManager<B, L, Y> {
    browser: B,
    store: Store<L>,
    settings: SettingsStore<Y>,
}

impl<B: Browser, L: StorageArea, Y: StorageArea> TabManager<B, L, Y> {
    /// `local` holds the saved list and tab times, `sync` holds settings
    pub fn new(browser: B, local: L, sync: Y) -> Self {
        TabManager {
            browser,
            store: Store::new(local),
            settings: SettingsStore::new(sync),
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn store(&self) -> &Store<L> {
        &self.store
    }

    pub fn settings(&self) -> &SettingsStore<Y> {
        &self.settings
    }

    pub fn tab_times(&self) -> TabTimes<'_, L> {
        TabTimes::new(&self.store)
    }

    /// Load settings; call once before anything else
    pub async fn init(&self) -> Result<()> {
        self.settings.load().await?;
        Ok(())
    }

    /// Background start: stamp open tabs, drop stale times, optionally purge the saved list
    pub async fn init_tabs(&self) -> Result<()> {
        let now = now_ms();
        if self.settings.snapshot().purge_closed_tabs {
            self.store.mutate_state(|state| state.saved_tabs.clear()).await?;
            info!("Purged closed tabs on startup");
        }
        self.reset_tab_times(now).await?;
        self.update_badge().await
    }

    /// Run one close check, logging instead of propagating failures
    pub async fn tick(&self) {
        if let Err(e) = self.check_to_close().await {
            error!("Close check failed: {}", e);
        }
    }

    /// Check forever, sleeping `checkInterval` ms between runs whatever the outcome
    pub async fn run<F, Fut>(&self, mut sleep: F)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            self.tick().await;
            let interval = self.settings.snapshot().check_interval;
            sleep(interval).await;
        }
    }

    pub async fn check_to_close(&self) -> Result<()> {
        self.check_to_close_at(now_ms()).await
    }

    pub async fn check_to_close_at(&self, now: i64) -> Result<()> {
        let settings = self.settings.snapshot();
        if settings.paused {
            debug!("Paused, skipping close check");
            return Ok(());
        }
        let cutoff = now - settings.stay_open_ms();
        let tab_times = self.tab_times();

        // The tab the user is looking at is never stale
        let mut in_use: Vec<i32> = self.browser.active_tabs().await?.iter().filter_map(|t| t.id).collect();
        if settings.filter_audio {
            in_use.extend(self.browser.audible_tabs().await?.iter().filter_map(|t| t.id));
        }
        tab_times.update_many(&in_use, None, now).await?;

        let groups = group_tabs(self.browser.windows().await?, settings.min_tabs_strategy);
        let times = tab_times.all().await?;
        let plan = plan_closures(groups, &times, cutoff, &settings);
        debug!(
            "Close check: {} to wrangle, {} refreshed",
            plan.to_wrangle.len(),
            plan.to_refresh.len()
        );

        tab_times.update_many(&plan.to_refresh, None, now).await?;
        self.wrangle_tabs_and_persist_at(&plan.to_wrangle, now).await
    }

    pub async fn wrangle_tabs_and_persist(&self, tabs: &[Tab]) -> Result<()> {
        self.wrangle_tabs_and_persist_at(tabs, now_ms()).await
    }

    /// Close `tabs` and move them to the front of the saved list
    pub async fn wrangle_tabs_and_persist_at(&self, tabs: &[Tab], now: i64) -> Result<()> {
        if tabs.is_empty() {
            return Ok(());
        }
        let settings = self.settings.snapshot();

        let ids: Vec<i32> = tabs.iter().filter_map(|t| t.id).collect();
        if !ids.is_empty() {
            self.browser.remove_tabs(ids);
        }

        let average = average_saved_tab_bytes(tabs);
        if average > AVERAGE_SAVED_TAB_BYTES {
            warn!(
                "Wrangled tabs average {} bytes each, above the {} byte budget",
                average, AVERAGE_SAVED_TAB_BYTES
            );
        }

        let saved = self
            .store
            .mutate_state(|state| {
                wrangle_into(state, tabs, settings.wrangle_option, settings.max_tabs as usize, now);
                state.saved_tabs.len()
            })
            .await?;
        info!("Wrangled {} tab(s), {} saved", tabs.len(), saved);

        self.update_badge().await
    }

    /// Delete entries from the saved list; returns the entries actually removed
    pub async fn remove_saved_tabs(&self, tabs: &[Tab]) -> Result<Vec<IndexedTab>> {
        let removed = self
            .store
            .mutate_state(|state| {
                let removed = state.remove_saved_tabs(tabs);
                state.total_tabs_removed += removed.len() as u64;
                removed
            })
            .await?;
        self.update_badge().await?;
        Ok(removed)
    }

    /// Reopen saved tabs and take them off the saved list
    ///
    /// Returns the saved entries that were found and removed.
    pub async fn unwrangle_tabs(&self, tabs: &[Tab]) -> Result<Vec<IndexedTab>> {
        for tab in tabs {
            match &tab.session_id {
                Some(session_id) => self.browser.restore_session(session_id).await?,
                None => self.browser.create_tab(&tab.url, false).await?,
            }
        }
        let removed = self
            .store
            .mutate_state(|state| {
                let removed = state.remove_saved_tabs(tabs);
                state.total_tabs_unwrangled += removed.len() as u64;
                removed
            })
            .await?;
        self.update_badge().await?;
        Ok(removed)
    }

    /// Put removed entries back at their original positions
    pub async fn reinsert_removed_tabs(&self, tabs: &[IndexedTab]) -> Result<()> {
        if tabs.is_empty() {
            return Ok(());
        }
        self.store
            .mutate_state(|state| {
                insert_at_indices(&mut state.saved_tabs, tabs);
                state.total_tabs_removed = state.total_tabs_removed.saturating_sub(tabs.len() as u64);
            })
            .await?;
        self.update_badge().await
    }

    /// Put restored entries back on the saved list; the reopened tabs stay open
    pub async fn reinsert_restored_tabs(&self, tabs: &[IndexedTab]) -> Result<()> {
        if tabs.is_empty() {
            return Ok(());
        }
        self.store
            .mutate_state(|state| {
                insert_at_indices(&mut state.saved_tabs, tabs);
                state.total_tabs_unwrangled = state.total_tabs_unwrangled.saturating_sub(tabs.len() as u64);
            })
            .await?;
        self.update_badge().await
    }

    pub async fn load_state(&self) -> Result<LocalState> {
        Ok(self.store.load_state().await?)
    }

    pub async fn on_created(&self, tab: &Tab) -> Result<()> {
        if let Some(id) = tab.id {
            self.tab_times().update(id, None, now_ms()).await?;
        }
        Ok(())
    }

    pub async fn on_activated(&self, tab_id: i32) -> Result<()> {
        self.tab_times().update(tab_id, None, now_ms()).await?;
        Ok(())
    }

    pub async fn on_removed(&self, tab_id: i32) -> Result<()> {
        self.tab_times().remove(tab_id).await?;
        if self.settings.snapshot().locked_ids.contains(&tab_id) {
            self.unlock_ids(&[tab_id]).await?;
        }
        Ok(())
    }

    /// Prerendering swapped `removed` for `added`
    pub async fn on_replaced(&self, added: i32, removed: i32) -> Result<()> {
        self.tab_times().remove(removed).await?;
        self.tab_times().update(added, None, now_ms()).await?;
        Ok(())
    }

    pub async fn lock_tab(&self, tab_id: i32) -> Result<()> {
        if self.settings.snapshot().locked_ids.contains(&tab_id) {
            return Ok(());
        }
        self.settings
            .mutate(SettingKey::LockedIds, |settings| {
                if !settings.locked_ids.contains(&tab_id) {
                    settings.locked_ids.push(tab_id);
                }
            })
            .await?;
        Ok(())
    }

    /// Unlock and restart the tab's inactivity clock
    pub async fn unlock_tab(&self, tab_id: i32) -> Result<()> {
        self.unlock_ids(&[tab_id]).await?;
        self.tab_times().update(tab_id, None, now_ms()).await?;
        Ok(())
    }

    /// Flip a tab's lock; returns whether it is now locked
    pub async fn toggle_lock(&self, tab_id: i32) -> Result<bool> {
        if self.settings.snapshot().locked_ids.contains(&tab_id) {
            self.unlock_tab(tab_id).await?;
            Ok(false)
        } else {
            self.lock_tab(tab_id).await?;
            Ok(true)
        }
    }

    async fn unlock_ids(&self, tab_ids: &[i32]) -> Result<()> {
        self.settings
            .mutate(SettingKey::LockedIds, |settings| {
                settings.locked_ids.retain(|id| !tab_ids.contains(id));
            })
            .await?;
        Ok(())
    }

    /// Whitelist the root domain of `tab`'s url
    pub async fn lock_domain(&self, tab: &Tab) -> Result<()> {
        let Some(domain) = extract_root_domain(&tab.url) else {
            return Err(SettingsError::InvalidValue {
                key: SettingKey::Whitelist.as_str(),
                message: format!("no domain in '{}'", tab.url),
            }
            .into());
        };
        if self.settings.snapshot().whitelist.contains(&domain) {
            return Ok(());
        }
        let effect = self
            .settings
            .mutate(SettingKey::Whitelist, |settings| {
                if !settings.whitelist.contains(&domain) {
                    settings.whitelist.push(domain);
                }
            })
            .await?;
        self.apply_effect(SettingKey::Whitelist, effect).await
    }

    /// Whether the engine would never close `tab`
    pub fn is_tab_locked(&self, tab: &Tab) -> bool {
        let settings = self.settings.snapshot();
        tab.pinned
            || tab.id.is_some_and(|id| settings.locked_ids.contains(&id))
            || settings.whitelist_match(&tab.url, &tab.title).is_some()
            || (settings.filter_audio && tab.audible)
            || (settings.filter_grouped_tabs && tab.is_grouped())
    }

    pub async fn handle_menu_action(&self, action: MenuAction, tab: &Tab) -> Result<()> {
        debug!("Menu action {} on {:?}", action.id(), tab.id);
        match action {
            MenuAction::LockTab => match tab.id {
                Some(id) => self.toggle_lock(id).await.map(|_| ()),
                None => Ok(()),
            },
            MenuAction::LockDomain => self.lock_domain(tab).await,
            MenuAction::WrangleTab => self.wrangle_tabs_and_persist(std::slice::from_ref(tab)).await,
        }
    }

    /// Validated setter followed by the setting's side effect
    pub async fn set_setting(&self, key: SettingKey, value: Value) -> Result<SettingEffect> {
        let effect = self.settings.set(key, value).await?;
        self.apply_effect(key, effect).await?;
        Ok(effect)
    }

    async fn apply_effect(&self, key: SettingKey, effect: SettingEffect) -> Result<()> {
        match effect {
            SettingEffect::ResetTabTimes => self.reset_tab_times(now_ms()).await?,
            SettingEffect::RefreshTabTimes => {
                let ids: Vec<i32> = self.browser.all_tabs().await?.iter().filter_map(|t| t.id).collect();
                self.tab_times().update_many(&ids, None, now_ms()).await?;
            }
            SettingEffect::Recheck => self.check_to_close().await?,
            SettingEffect::None => {}
        }
        if key == SettingKey::ShowBadgeCount {
            self.update_badge().await?;
        }
        Ok(())
    }

    async fn reset_tab_times(&self, now: i64) -> Result<()> {
        let ids: Vec<i32> = self.browser.all_tabs().await?.iter().filter_map(|t| t.id).collect();
        self.tab_times().reset(&ids, now).await?;
        Ok(())
    }

    /// Show the saved tab count on the toolbar badge, or clear it
    pub async fn update_badge(&self) -> Result<()> {
        let text = if self.settings.snapshot().show_badge_count {
            let count = self.store.load_state().await?.saved_tabs.len();
            if count == 0 { String::new() } else { count.to_string() }
        } else {
            String::new()
        };
        self.browser.set_badge_text(&text);
        Ok(())
    }
}
