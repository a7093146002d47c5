/// Background service worker entry points
///
/// `background.js` calls `start_background` once and forwards the
/// `chrome.tabs`, `chrome.contextMenus` and `chrome.storage` events here.
use log::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::chrome::{js_error, sleep};
use crate::context::{current, install, js_err};
use crate::storage::StorageChanges;
use crate::tab_data::Tab;
use crate::tab_manager::MenuAction;

#[wasm_bindgen]
pub async fn start_background() -> Result<(), JsValue> {
    let manager = install();
    manager.init().await.map_err(js_err)?;
    manager.init_tabs().await.map_err(js_err)?;
    info!("Background context started");

    spawn_local(async move {
        manager
            .run(|ms| async move {
                if let Err(e) = sleep(ms).await {
                    warn!("Timer failed: {}", js_error(e));
                }
            })
            .await;
    });
    Ok(())
}

#[wasm_bindgen]
pub async fn on_tab_created(tab: JsValue) -> Result<(), JsValue> {
    let tab: Tab = serde_wasm_bindgen::from_value(tab).map_err(js_err)?;
    current()?.on_created(&tab).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn on_tab_activated(tab_id: i32) -> Result<(), JsValue> {
    current()?.on_activated(tab_id).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn on_tab_removed(tab_id: i32) -> Result<(), JsValue> {
    current()?.on_removed(tab_id).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn on_tab_replaced(added_tab_id: i32, removed_tab_id: i32) -> Result<(), JsValue> {
    current()?
        .on_replaced(added_tab_id, removed_tab_id)
        .await
        .map_err(js_err)
}

#[wasm_bindgen]
pub async fn on_menu_clicked(menu_item_id: String, tab: JsValue) -> Result<(), JsValue> {
    let action: MenuAction = menu_item_id.parse().map_err(|e: String| JsValue::from_str(&e))?;
    let tab: Tab = serde_wasm_bindgen::from_value(tab).map_err(js_err)?;
    current()?.handle_menu_action(action, &tab).await.map_err(js_err)
}

/// Keep the settings cache in step with writes from the popup
#[wasm_bindgen]
pub fn on_storage_changed(changes: JsValue, area_name: String) -> Result<(), JsValue> {
    if area_name != "sync" {
        return Ok(());
    }
    let changes: StorageChanges = serde_wasm_bindgen::from_value(changes).map_err(js_err)?;
    current()?.settings().apply_changes(&changes);
    Ok(())
}

/// Menu ids registered by the JS glue when `createContextMenu` is on
#[wasm_bindgen]
pub fn context_menu_ids() -> Result<JsValue, JsValue> {
    if !current()?.settings().snapshot().create_context_menu {
        return Ok(js_sys::Array::new().into());
    }
    let ids: js_sys::Array = [MenuAction::LockTab, MenuAction::LockDomain, MenuAction::WrangleTab]
        .into_iter()
        .map(|action| JsValue::from_str(action.id()))
        .collect();
    Ok(ids.into())
}
