/// The browser APIs the engine drives: tabs, windows, sessions and the badge
use crate::error::BrowserError;
use crate::tab_data::{Tab, Window};

#[allow(async_fn_in_trait)]
pub trait Browser {
    /// Every normal window with its tabs populated
    async fn windows(&self) -> Result<Vec<Window>, BrowserError>;

    /// The active tab of each window
    async fn active_tabs(&self) -> Result<Vec<Tab>, BrowserError>;

    async fn audible_tabs(&self) -> Result<Vec<Tab>, BrowserError>;

    async fn all_tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        Ok(self.windows().await?.into_iter().flat_map(|w| w.tabs).collect())
    }

    /// Close tabs in one batched call without waiting for completion
    fn remove_tabs(&self, tab_ids: Vec<i32>);

    async fn create_tab(&self, url: &str, active: bool) -> Result<(), BrowserError>;

    /// Reopen a recently closed tab through the sessions API
    async fn restore_session(&self, session_id: &str) -> Result<(), BrowserError>;

    fn set_badge_text(&self, text: &str);
}
