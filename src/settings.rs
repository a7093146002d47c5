//! User settings kept in the synced storage area.
//!
//! Every key has a validator picked by `validator_for`; numeric keys are
//! range-checked, the rest only have to deserialize into the `Settings` field
//! type. Some keys carry a side effect the engine applies after a successful
//! write (see [`SettingEffect`]).

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SettingsError;
use crate::lock::LockManager;
use crate::storage::{StorageArea, StorageChanges, StorageItems};

/// How newly wrangled tabs merge with ones already in the saved list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrangleOption {
    #[serde(rename = "withDuplicates", alias = "withDupes")]
    WithDuplicates,
    #[serde(rename = "exactURLMatch")]
    ExactUrlMatch,
    #[serde(rename = "hostnameAndTitleMatch")]
    HostnameAndTitleMatch,
}

/// Whether `minTabs` applies to each window or to all windows summed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MinTabsStrategy {
    AllWindows,
    GivenWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Milliseconds between close checks
    pub check_interval: u32,
    pub create_context_menu: bool,
    /// Never close tabs that are playing audio
    pub filter_audio: bool,
    /// Never close tabs that belong to a tab group
    pub filter_grouped_tabs: bool,
    pub locked_ids: Vec<i32>,
    /// Maximum length of the saved list
    pub max_tabs: u32,
    /// Tabs always left open
    pub min_tabs: u32,
    pub min_tabs_strategy: MinTabsStrategy,
    pub minutes_inactive: u32,
    pub paused: bool,
    /// Clear the saved list when the background context starts
    pub purge_closed_tabs: bool,
    pub seconds_inactive: u32,
    pub show_badge_count: bool,
    /// Substrings of URLs or titles that are never closed
    pub whitelist: Vec<String>,
    pub wrangle_option: WrangleOption,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            check_interval: 5000,
            create_context_menu: true,
            filter_audio: false,
            filter_grouped_tabs: false,
            locked_ids: Vec::new(),
            max_tabs: 100,
            min_tabs: 5,
            min_tabs_strategy: MinTabsStrategy::AllWindows,
            minutes_inactive: 60,
            paused: false,
            purge_closed_tabs: false,
            seconds_inactive: 0,
            show_badge_count: false,
            whitelist: vec!["about:".to_string(), "chrome://".to_string()],
            wrangle_option: WrangleOption::WithDuplicates,
        }
    }
}

impl Settings {
    /// How long a tab may stay inactive before it is eligible for closing
    pub fn stay_open_ms(&self) -> i64 {
        i64::from(self.minutes_inactive) * 60_000 + i64::from(self.seconds_inactive) * 1000
    }

    /// First whitelist pattern contained in the url or the title
    pub fn whitelist_match(&self, url: &str, title: &str) -> Option<&str> {
        self.whitelist
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .find(|pattern| url.contains(pattern.as_str()) || title.contains(pattern.as_str()))
            .map(String::as_str)
    }

    pub fn get(&self, key: SettingKey) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove(key.as_str()).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Copy of these settings with `key` replaced, type-checked by deserialization
    fn with_value(&self, key: SettingKey, value: Value) -> Result<Settings, serde_json::Error> {
        let mut fields = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            _ => StorageItems::new(),
        };
        fields.insert(key.as_str().to_string(), value);
        serde_json::from_value(Value::Object(fields))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    CheckInterval,
    CreateContextMenu,
    FilterAudio,
    FilterGroupedTabs,
    LockedIds,
    MaxTabs,
    MinTabs,
    MinTabsStrategy,
    MinutesInactive,
    Paused,
    PurgeClosedTabs,
    SecondsInactive,
    ShowBadgeCount,
    Whitelist,
    WrangleOption,
}

impl SettingKey {
    pub const ALL: [SettingKey; 15] = [
        SettingKey::CheckInterval,
        SettingKey::CreateContextMenu,
        SettingKey::FilterAudio,
        SettingKey::FilterGroupedTabs,
        SettingKey::LockedIds,
        SettingKey::MaxTabs,
        SettingKey::MinTabs,
        SettingKey::MinTabsStrategy,
        SettingKey::MinutesInactive,
        SettingKey::Paused,
        SettingKey::PurgeClosedTabs,
        SettingKey::SecondsInactive,
        SettingKey::ShowBadgeCount,
        SettingKey::Whitelist,
        SettingKey::WrangleOption,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::CheckInterval => "checkInterval",
            SettingKey::CreateContextMenu => "createContextMenu",
            SettingKey::FilterAudio => "filterAudio",
            SettingKey::FilterGroupedTabs => "filterGroupedTabs",
            SettingKey::LockedIds => "lockedIds",
            SettingKey::MaxTabs => "maxTabs",
            SettingKey::MinTabs => "minTabs",
            SettingKey::MinTabsStrategy => "minTabsStrategy",
            SettingKey::MinutesInactive => "minutesInactive",
            SettingKey::Paused => "paused",
            SettingKey::PurgeClosedTabs => "purgeClosedTabs",
            SettingKey::SecondsInactive => "secondsInactive",
            SettingKey::ShowBadgeCount => "showBadgeCount",
            SettingKey::Whitelist => "whitelist",
            SettingKey::WrangleOption => "wrangleOption",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

/// Validation applied before a setting is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Stored as given once it deserializes into the field type
    PassThrough,
    /// Parsed as an integer (numbers or numeric strings) within bounds
    Integer { min: i64, max: Option<i64> },
}

pub fn validator_for(key: SettingKey) -> Validator {
    match key {
        SettingKey::MaxTabs => Validator::Integer { min: 1, max: Some(1000) },
        SettingKey::MinTabs => Validator::Integer { min: 0, max: None },
        SettingKey::MinutesInactive => Validator::Integer { min: 0, max: None },
        SettingKey::SecondsInactive => Validator::Integer { min: 0, max: Some(59) },
        SettingKey::CheckInterval => Validator::Integer { min: 1000, max: None },
        _ => Validator::PassThrough,
    }
}

impl Validator {
    /// Normalize `value` or reject it
    pub fn validate(self, key: SettingKey, value: Value) -> Result<Value, SettingsError> {
        match self {
            Validator::PassThrough => Ok(value),
            Validator::Integer { min, max } => {
                let number = parse_integer(key, &value)?;
                match max {
                    Some(max) if number < min || number > max => Err(SettingsError::OutOfRange {
                        key: key.as_str(),
                        min,
                        max,
                        value: number,
                    }),
                    None if number < min => Err(SettingsError::TooSmall {
                        key: key.as_str(),
                        min,
                        value: number,
                    }),
                    _ => Ok(Value::from(number)),
                }
            }
        }
    }
}

fn parse_integer(key: SettingKey, value: &Value) -> Result<i64, SettingsError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| SettingsError::NotAnInteger {
        key: key.as_str(),
        value: value.to_string(),
    })
}

/// Follow-up the engine performs after a setting changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingEffect {
    None,
    /// Inactivity threshold changed: stamp every open tab as just accessed
    ResetTabTimes,
    /// Unpaused: refresh every open tab before the next check
    RefreshTabTimes,
    /// Eligibility rules changed: run a close check now
    Recheck,
}

fn effect_of(key: SettingKey, old: &Settings, new: &Settings) -> SettingEffect {
    if old == new {
        return SettingEffect::None;
    }
    match key {
        SettingKey::MinutesInactive | SettingKey::SecondsInactive => SettingEffect::ResetTabTimes,
        SettingKey::Paused if !new.paused => SettingEffect::RefreshTabTimes,
        SettingKey::MinTabs
        | SettingKey::MinTabsStrategy
        | SettingKey::FilterAudio
        | SettingKey::FilterGroupedTabs
        | SettingKey::Whitelist
        | SettingKey::LockedIds => SettingEffect::Recheck,
        _ => SettingEffect::None,
    }
}

/// Settings cache over a storage area
pub struct SettingsStore<S> {
    area: S,
    cache: RefCell<Settings>,
    locks: LockManager,
}

impl<S: StorageArea> SettingsStore<S> {
    pub fn new(area: S) -> Self {
        SettingsStore {
            area,
            cache: RefCell::new(Settings::default()),
            locks: LockManager::new(),
        }
    }

    /// Fill the cache from storage; malformed stored values keep their default
    pub async fn load(&self) -> Result<(), SettingsError> {
        let keys: Vec<&str> = SettingKey::ALL.iter().map(|key| key.as_str()).collect();
        let items = self.area.get(&keys).await?;

        let mut settings = Settings::default();
        for key in SettingKey::ALL {
            if let Some(value) = items.get(key.as_str()) {
                match settings.with_value(key, value.clone()) {
                    Ok(updated) => settings = updated,
                    Err(e) => warn!("Ignoring stored {}: {}", key, e),
                }
            }
        }
        *self.cache.borrow_mut() = settings;
        Ok(())
    }

    pub fn get(&self, key: SettingKey) -> Value {
        self.cache.borrow().get(key)
    }

    pub fn snapshot(&self) -> Settings {
        self.cache.borrow().clone()
    }

    /// Validate, store, and cache one setting
    pub async fn set(&self, key: SettingKey, value: Value) -> Result<SettingEffect, SettingsError> {
        self.update(key, |_| value).await
    }

    /// Edit the current settings and store the result for `key`
    ///
    /// `edit` sees the cache as it is once the key's lock is held, so
    /// concurrent edits of a list setting do not overwrite each other.
    pub async fn mutate<F>(&self, key: SettingKey, edit: F) -> Result<SettingEffect, SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        self.update(key, |current| {
            let mut edited = current.clone();
            edit(&mut edited);
            edited.get(key)
        })
        .await
    }

    async fn update<F>(&self, key: SettingKey, next_value: F) -> Result<SettingEffect, SettingsError>
    where
        F: FnOnce(&Settings) -> Value,
    {
        let lock = format!("settings:{key}");
        self.locks
            .acquire(&lock, move || async move {
                let old = self.snapshot();
                let value = validator_for(key).validate(key, next_value(&old))?;
                let new = old
                    .with_value(key, value)
                    .map_err(|e| SettingsError::InvalidValue {
                        key: key.as_str(),
                        message: e.to_string(),
                    })?;

                let mut items = StorageItems::new();
                items.insert(key.as_str().to_string(), new.get(key));
                self.area.set(items).await?;

                let effect = effect_of(key, &old, &new);
                *self.cache.borrow_mut() = new;
                debug!("Setting {} stored ({:?})", key, effect);
                Ok::<_, SettingsError>(effect)
            })
            .await
    }

    /// Mirror writes made by another execution context
    pub fn apply_changes(&self, changes: &StorageChanges) {
        let mut settings = self.snapshot();
        for (name, change) in changes {
            let Ok(key) = name.parse::<SettingKey>() else {
                continue;
            };
            let value = change
                .new_value
                .clone()
                .unwrap_or_else(|| Settings::default().get(key));
            match settings.with_value(key, value) {
                Ok(updated) => settings = updated,
                Err(e) => warn!("Ignoring changed {}: {}", key, e),
            }
        }
        *self.cache.borrow_mut() = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageChange};
    use futures::executor::block_on;
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_tabs, 100);
        assert_eq!(settings.min_tabs, 5);
        assert_eq!(settings.stay_open_ms(), 3_600_000);
        assert_eq!(settings.wrangle_option, WrangleOption::WithDuplicates);
    }

    #[test]
    fn test_max_tabs_rejects_invalid_values() {
        let store = SettingsStore::new(MemoryStorage::new());

        for bad in [json!(0), json!("abc"), json!(1100)] {
            assert!(block_on(store.set(SettingKey::MaxTabs, bad.clone())).is_err(), "{bad} accepted");
        }
        assert_eq!(store.get(SettingKey::MaxTabs), json!(100));
    }

    #[test]
    fn test_max_tabs_accepts_bounds() {
        let store = SettingsStore::new(MemoryStorage::new());

        block_on(store.set(SettingKey::MaxTabs, json!(1))).unwrap();
        assert_eq!(store.get(SettingKey::MaxTabs), json!(1));

        block_on(store.set(SettingKey::MaxTabs, json!("1000"))).unwrap();
        assert_eq!(store.get(SettingKey::MaxTabs), json!(1000));
    }

    #[test]
    fn test_numeric_ranges() {
        let store = SettingsStore::new(MemoryStorage::new());

        assert_eq!(
            block_on(store.set(SettingKey::SecondsInactive, json!(60))),
            Err(SettingsError::OutOfRange { key: "secondsInactive", min: 0, max: 59, value: 60 })
        );
        assert_eq!(
            block_on(store.set(SettingKey::MinTabs, json!(-1))),
            Err(SettingsError::TooSmall { key: "minTabs", min: 0, value: -1 })
        );
        assert!(block_on(store.set(SettingKey::MinutesInactive, json!(2.5))).is_err());
        assert!(block_on(store.set(SettingKey::MinutesInactive, json!("10abc"))).is_err());
        assert!(block_on(store.set(SettingKey::SecondsInactive, json!(59))).is_ok());
    }

    #[test]
    fn test_pass_through_type_checked() {
        let store = SettingsStore::new(MemoryStorage::new());

        assert!(block_on(store.set(SettingKey::Paused, json!("yes"))).is_err());
        block_on(store.set(SettingKey::WrangleOption, json!("withDupes"))).unwrap();
        assert_eq!(store.snapshot().wrangle_option, WrangleOption::WithDuplicates);
        block_on(store.set(SettingKey::WrangleOption, json!("exactURLMatch"))).unwrap();
        assert_eq!(store.get(SettingKey::WrangleOption), json!("exactURLMatch"));
    }

    #[test]
    fn test_effects() {
        let store = SettingsStore::new(MemoryStorage::new());

        assert_eq!(block_on(store.set(SettingKey::MinutesInactive, json!(10))), Ok(SettingEffect::ResetTabTimes));
        assert_eq!(block_on(store.set(SettingKey::MinutesInactive, json!("10"))), Ok(SettingEffect::None));
        assert_eq!(block_on(store.set(SettingKey::Paused, json!(true))), Ok(SettingEffect::None));
        assert_eq!(block_on(store.set(SettingKey::Paused, json!(false))), Ok(SettingEffect::RefreshTabTimes));
        assert_eq!(block_on(store.set(SettingKey::MinTabs, json!(2))), Ok(SettingEffect::Recheck));
        assert_eq!(block_on(store.set(SettingKey::ShowBadgeCount, json!(true))), Ok(SettingEffect::None));
    }

    #[test]
    fn test_failed_write_keeps_cache() {
        let area = MemoryStorage::new();
        let store = SettingsStore::new(area.clone());
        area.set_failure(Some("MAX_WRITE_OPERATIONS_PER_MINUTE"));

        assert!(block_on(store.set(SettingKey::MaxTabs, json!(20))).is_err());
        assert_eq!(store.snapshot().max_tabs, 100);
    }

    #[test]
    fn test_load_reads_stored_values() {
        let area = MemoryStorage::new();
        let mut items = StorageItems::new();
        items.insert("minTabs".to_string(), json!(2));
        items.insert("whitelist".to_string(), json!(["github.com"]));
        items.insert("maxTabs".to_string(), json!("not a number"));
        block_on(area.set(items)).unwrap();

        let store = SettingsStore::new(area);
        block_on(store.load()).unwrap();

        let settings = store.snapshot();
        assert_eq!(settings.min_tabs, 2);
        assert_eq!(settings.whitelist, vec!["github.com".to_string()]);
        assert_eq!(settings.max_tabs, 100);
    }

    #[test]
    fn test_apply_changes_from_other_context() {
        let area = MemoryStorage::new();
        let background = Rc::new(SettingsStore::new(area.clone()));
        let popup = SettingsStore::new(area.clone());

        let listener = background.clone();
        area.on_changed(move |changes| listener.apply_changes(changes));

        block_on(popup.set(SettingKey::Paused, json!(true))).unwrap();
        assert!(background.snapshot().paused);

        let mut removed = StorageChanges::new();
        removed.insert("paused".to_string(), StorageChange { old_value: Some(json!(true)), new_value: None });
        background.apply_changes(&removed);
        assert!(!background.snapshot().paused);
    }

    #[test]
    fn test_whitelist_match() {
        let settings = Settings::default();
        assert_eq!(settings.whitelist_match("chrome://extensions", "Extensions"), Some("chrome://"));
        assert_eq!(settings.whitelist_match("https://example.com", "about: me"), Some("about:"));
        assert_eq!(settings.whitelist_match("https://example.com", "Example"), None);
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!("maxTabs".parse::<SettingKey>(), Ok(SettingKey::MaxTabs));
        assert_eq!("theme".parse::<SettingKey>(), Err(SettingsError::UnknownKey("theme".to_string())));
    }

    #[test]
    fn test_mutate_edits_current_value() {
        let store = SettingsStore::new(MemoryStorage::new());
        block_on(store.set(SettingKey::LockedIds, json!([3]))).unwrap();

        let effect = block_on(store.mutate(SettingKey::LockedIds, |settings| settings.locked_ids.push(4))).unwrap();

        assert_eq!(effect, SettingEffect::Recheck);
        assert_eq!(store.get(SettingKey::LockedIds), json!([3, 4]));
    }
}
