/// Tab Wrangler - Chrome Extension that closes inactive tabs
/// Built with Rust + WASM

mod background;
mod browser;
mod chrome;
mod context;
mod domain;
mod error;
mod import_export;
mod lock;
mod operations;
mod popup;
mod settings;
mod storage;
mod tab_data;
mod tab_manager;
mod tab_times;
mod undo;

pub use browser::Browser;
pub use error::{BrowserError, ImportError, SettingsError, StorageError, WranglerError};
pub use import_export::{export_data, export_file_name, import_data, parse_backup};
pub use settings::{MinTabsStrategy, SettingEffect, SettingKey, Settings, SettingsStore, WrangleOption};
pub use storage::{LocalState, MemoryStorage, StorageArea, StorageChange, StorageChanges, StorageItems, Store};
pub use tab_data::{IndexedTab, Tab, Window};
pub use tab_manager::{MenuAction, TabManager};
pub use undo::{UndoLog, UndoableAction};

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export domain extraction for JavaScript access
#[wasm_bindgen]
pub fn extract_root_domain(url: &str) -> String {
    domain::extract_root_domain(url).unwrap_or_default()
}
