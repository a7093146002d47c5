/// Tab operations: close planning, dedupe, saved-list bookkeeping
use std::collections::HashSet;

use crate::domain::extract_hostname;
use crate::settings::{MinTabsStrategy, Settings, WrangleOption};
use crate::storage::LocalState;
use crate::tab_data::{IndexedTab, Tab, Window};
use crate::tab_times::TabTimeMap;

/// What one close check decided
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClosePlan {
    /// Tabs to wrangle, in the order they were selected
    pub to_wrangle: Vec<Tab>,
    /// Tabs whose last-accessed time is refreshed instead of closing them
    pub to_refresh: Vec<i32>,
}

/// Group a window's tabs the way `minTabs` is counted
pub fn group_tabs(windows: Vec<Window>, strategy: MinTabsStrategy) -> Vec<Vec<Tab>> {
    match strategy {
        MinTabsStrategy::GivenWindow => windows.into_iter().map(|w| w.tabs).collect(),
        MinTabsStrategy::AllWindows => vec![windows.into_iter().flat_map(|w| w.tabs).collect()],
    }
}

/// Decide which tabs to close, refresh, or leave alone
///
/// Algorithm, per group:
/// 1. Drop pinned tabs, and audible / grouped tabs when those filters are on
/// 2. Candidates: tabs last accessed before `cutoff`, or without an id
/// 3. If the group has no more than `minTabs` tabs, refresh all of them
/// 4. Keep at most `len - minTabs` candidates, least recently accessed first
/// 5. Locked ids are refreshed, whitelisted tabs skipped, the rest wrangled
pub fn plan_closures(groups: Vec<Vec<Tab>>, times: &TabTimeMap, cutoff: i64, settings: &Settings) -> ClosePlan {
    let min_tabs = settings.min_tabs as usize;
    let locked: HashSet<i32> = settings.locked_ids.iter().copied().collect();
    let mut plan = ClosePlan::default();

    for group in groups {
        let tabs: Vec<Tab> = group
            .into_iter()
            .filter(|tab| !tab.pinned)
            .filter(|tab| !(settings.filter_audio && tab.audible))
            .filter(|tab| !(settings.filter_grouped_tabs && tab.is_grouped()))
            .collect();

        if tabs.len() <= min_tabs {
            plan.to_refresh.extend(tabs.iter().filter_map(|tab| tab.id));
            continue;
        }

        let last_access = |tab: &Tab| tab.id.and_then(|id| times.get(&id).copied());
        let mut to_cut: Vec<Tab> = tabs
            .iter()
            .filter(|tab| tab.id.is_none() || last_access(tab).is_some_and(|time| time < cutoff))
            .cloned()
            .collect();
        to_cut.sort_by_key(|tab| last_access(tab).unwrap_or(i64::MIN));
        to_cut.truncate(tabs.len() - min_tabs);

        for tab in to_cut {
            match tab.id {
                Some(id) if locked.contains(&id) => plan.to_refresh.push(id),
                _ if settings.whitelist_match(&tab.url, &tab.title).is_some() => {}
                _ => plan.to_wrangle.push(tab),
            }
        }
    }

    plan
}

/// Position of an existing saved entry `tab` should replace
pub fn find_duplicate_position(saved: &[Tab], tab: &Tab, option: WrangleOption) -> Option<usize> {
    match option {
        WrangleOption::WithDuplicates => None,
        WrangleOption::ExactUrlMatch => saved.iter().position(|saved| saved.url == tab.url),
        WrangleOption::HostnameAndTitleMatch => {
            let hostname = extract_hostname(&tab.url);
            saved
                .iter()
                .position(|saved| saved.title == tab.title && extract_hostname(&saved.url) == hostname)
        }
    }
}

/// Add wrangled tabs to the front of the saved list
///
/// Dedupe runs against the list as it is mutated, so later tabs in the batch
/// can replace earlier ones. Returns the ids of the tabs to close.
pub fn wrangle_into(state: &mut LocalState, tabs: &[Tab], option: WrangleOption, max_tabs: usize, now: i64) -> Vec<i32> {
    let mut closed_ids = Vec::with_capacity(tabs.len());

    for tab in tabs {
        if let Some(position) = find_duplicate_position(&state.saved_tabs, tab, option) {
            state.saved_tabs.remove(position);
        }

        let mut saved = tab.clone();
        saved.closed_at = Some(now);
        state.saved_tabs.insert(0, saved);
        state.total_tabs_wrangled += 1;

        if let Some(id) = tab.id {
            closed_ids.push(id);
        }
    }

    state.trim(max_tabs);
    closed_ids
}

/// Re-insert tabs at their original positions
///
/// Inserts in ascending index order so each entry lands where it was before
/// the removal; indices past the end are clamped.
pub fn insert_at_indices(saved: &mut Vec<Tab>, tabs: &[IndexedTab]) {
    let mut ordered: Vec<&IndexedTab> = tabs.iter().collect();
    ordered.sort_by_key(|indexed| indexed.index);

    for indexed in ordered {
        let index = indexed.index.min(saved.len());
        saved.insert(index, indexed.tab.clone());
    }
}
