/// The per-context `TabManager` shared by the `#[wasm_bindgen]` entry points
use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::chrome::{ChromeBrowser, ChromeStorage};
use crate::tab_manager::TabManager;

pub type ChromeTabManager = TabManager<ChromeBrowser, ChromeStorage, ChromeStorage>;

thread_local! {
    static MANAGER: RefCell<Option<Rc<ChromeTabManager>>> = const { RefCell::new(None) };
}

/// Build this context's manager on first use
pub fn install() -> Rc<ChromeTabManager> {
    MANAGER.with(|manager| {
        manager
            .borrow_mut()
            .get_or_insert_with(|| {
                Rc::new(TabManager::new(
                    ChromeBrowser,
                    ChromeStorage::local(),
                    ChromeStorage::sync(),
                ))
            })
            .clone()
    })
}

pub fn current() -> Result<Rc<ChromeTabManager>, JsValue> {
    MANAGER
        .with(|manager| manager.borrow().clone())
        .ok_or_else(|| JsValue::from_str("Tab Wrangler is not initialized in this context"))
}

pub fn js_err(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}
