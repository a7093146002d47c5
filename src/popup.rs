/// Popup entry points: saved-list edits with undo/redo, settings, backups
///
/// The undo log belongs to this popup session and disappears with it.
use std::rc::Rc;

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::chrome::exportToFile;
use crate::context::{current, install, js_err};
use crate::import_export::{export_data, export_file_name, export_file_name_today, import_data};
use crate::settings::SettingKey;
use crate::tab_data::{IndexedTab, Tab};
use crate::undo::UndoLog;

thread_local! {
    static UNDO_LOG: Rc<UndoLog> = Rc::new(UndoLog::new());
}

fn undo_log() -> Rc<UndoLog> {
    UNDO_LOG.with(Rc::clone)
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_err)
}

#[wasm_bindgen]
pub async fn start_popup_session() -> Result<(), JsValue> {
    install().init().await.map_err(js_err)?;
    undo_log().clear();
    debug!("Popup session started");
    Ok(())
}

/// Saved list and counters for rendering
#[wasm_bindgen]
pub async fn load_saved_state() -> Result<JsValue, JsValue> {
    let state = current()?.load_state().await.map_err(js_err)?;
    to_js(&state)
}

/// `tabs` is an array of `{ index, tab }`
#[wasm_bindgen]
pub async fn remove_saved_tabs(tabs: JsValue) -> Result<(), JsValue> {
    let tabs: Vec<IndexedTab> = serde_wasm_bindgen::from_value(tabs).map_err(js_err)?;
    undo_log().remove_tabs(&*current()?, tabs).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn restore_saved_tabs(tabs: JsValue) -> Result<(), JsValue> {
    let tabs: Vec<Tab> = serde_wasm_bindgen::from_value(tabs).map_err(js_err)?;
    undo_log().restore_tabs(&*current()?, tabs).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn undo() -> Result<bool, JsValue> {
    undo_log().undo(&*current()?).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn redo() -> Result<bool, JsValue> {
    undo_log().redo(&*current()?).await.map_err(js_err)
}

#[wasm_bindgen]
pub fn can_undo() -> bool {
    undo_log().can_undo()
}

#[wasm_bindgen]
pub fn can_redo() -> bool {
    undo_log().can_redo()
}

#[wasm_bindgen]
pub fn get_setting(key: &str) -> Result<JsValue, JsValue> {
    let key: SettingKey = key.parse().map_err(js_err)?;
    to_js(&current()?.settings().get(key))
}

/// Rejects with the validation message when the value is refused
#[wasm_bindgen]
pub async fn set_setting(key: String, value: JsValue) -> Result<(), JsValue> {
    let key: SettingKey = key.parse().map_err(js_err)?;
    let value: serde_json::Value = serde_wasm_bindgen::from_value(value).map_err(js_err)?;
    current()?.set_setting(key, value).await.map_err(js_err)?;
    Ok(())
}

#[wasm_bindgen]
pub async fn toggle_tab_lock(tab_id: i32) -> Result<bool, JsValue> {
    current()?.toggle_lock(tab_id).await.map_err(js_err)
}

#[wasm_bindgen]
pub fn is_tab_locked(tab: JsValue) -> Result<bool, JsValue> {
    let tab: Tab = serde_wasm_bindgen::from_value(tab).map_err(js_err)?;
    Ok(current()?.is_tab_locked(&tab))
}

/// Download the saved list and counters as today's export file
#[wasm_bindgen]
pub async fn export_backup() -> Result<(), JsValue> {
    let json = export_data(current()?.store()).await.map_err(js_err)?;
    exportToFile(&json, &export_file_name_today());
    Ok(())
}

#[wasm_bindgen]
pub fn backup_file_name(year: i32, month: u32, day: u32) -> Result<String, JsValue> {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(export_file_name)
        .ok_or_else(|| JsValue::from_str("Invalid date"))
}

/// Replace the saved list from a backup; storage is untouched on rejection
#[wasm_bindgen]
pub async fn import_backup(text: String) -> Result<(), JsValue> {
    let manager = current()?;
    import_data(manager.store(), &text).await.map_err(js_err)?;
    manager.update_badge().await.map_err(js_err)
}
