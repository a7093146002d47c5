/// `chrome.*` implementations of the browser and storage seams
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::browser::Browser;
use crate::error::{BrowserError, StorageError};
use crate::storage::{StorageArea, StorageItems};
use crate::tab_data::{Tab, Window};

// Import JS bridge functions
#[wasm_bindgen(module = "/chrome.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getAllWindows() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryTabs(query: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn createTab(url: &str, active: bool) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn restoreSession(session_id: &str) -> Result<(), JsValue>;

    fn setBadgeText(text: &str);

    #[wasm_bindgen(catch)]
    async fn storageGet(area: &str, keys: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(area: &str, items: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(area: &str, keys: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    pub async fn sleep(ms: u32) -> Result<(), JsValue>;

    pub fn exportToFile(data: &str, filename: &str);
}

/// Message carried by a rejected promise (`chrome.runtime.lastError` included)
pub fn js_error(e: JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{:?}", e))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("Failed to parse: {:?}", e))
}

fn api_error(call: &'static str) -> impl Fn(String) -> BrowserError {
    move |message| BrowserError::Api { call, message }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TabQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audible: Option<bool>,
}

pub struct ChromeBrowser;

impl ChromeBrowser {
    async fn query(&self, query: TabQuery) -> Result<Vec<Tab>, BrowserError> {
        let query = to_js(&query).map_err(api_error("tabs.query"))?;
        let tabs = queryTabs(query)
            .await
            .map_err(|e| api_error("tabs.query")(js_error(e)))?;
        from_js(tabs).map_err(api_error("tabs.query"))
    }
}

impl Browser for ChromeBrowser {
    async fn windows(&self) -> Result<Vec<Window>, BrowserError> {
        let windows = getAllWindows()
            .await
            .map_err(|e| api_error("windows.getAll")(js_error(e)))?;
        from_js(windows).map_err(api_error("windows.getAll"))
    }

    async fn active_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        self.query(TabQuery { active: Some(true), audible: None }).await
    }

    async fn audible_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        self.query(TabQuery { active: None, audible: Some(true) }).await
    }

    fn remove_tabs(&self, tab_ids: Vec<i32>) {
        let tab_ids_js = match to_js(&tab_ids) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Not closing tabs {:?}: {}", tab_ids, e);
                return;
            }
        };
        spawn_local(async move {
            if let Err(e) = removeTabs(tab_ids_js).await {
                warn!("Failed to close tabs: {}", js_error(e));
            }
        });
    }

    async fn create_tab(&self, url: &str, active: bool) -> Result<(), BrowserError> {
        createTab(url, active)
            .await
            .map_err(|e| api_error("tabs.create")(js_error(e)))
    }

    async fn restore_session(&self, session_id: &str) -> Result<(), BrowserError> {
        restoreSession(session_id)
            .await
            .map_err(|e| api_error("sessions.restore")(js_error(e)))
    }

    fn set_badge_text(&self, text: &str) {
        setBadgeText(text);
    }
}

/// One `chrome.storage` area, `"local"` or `"sync"`
#[derive(Clone, Copy)]
pub struct ChromeStorage {
    area: &'static str,
}

impl ChromeStorage {
    pub fn local() -> Self {
        ChromeStorage { area: "local" }
    }

    pub fn sync() -> Self {
        ChromeStorage { area: "sync" }
    }
}

impl StorageArea for ChromeStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageItems, StorageError> {
        let keys = to_js(keys).map_err(StorageError::Backend)?;
        let items = storageGet(self.area, keys)
            .await
            .map_err(|e| StorageError::Backend(js_error(e)))?;
        if items.is_null() || items.is_undefined() {
            return Ok(StorageItems::new());
        }
        from_js(items).map_err(StorageError::Backend)
    }

    async fn set(&self, items: StorageItems) -> Result<(), StorageError> {
        let items = to_js(&items).map_err(StorageError::Backend)?;
        storageSet(self.area, items)
            .await
            .map_err(|e| StorageError::Backend(js_error(e)))
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let keys = to_js(keys).map_err(StorageError::Backend)?;
        storageRemove(self.area, keys)
            .await
            .map_err(|e| StorageError::Backend(js_error(e)))
    }
}
