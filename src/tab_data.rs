/// Data structures for Tab Wrangler
use serde::{Deserialize, Serialize};

/// Group id the browser reports for tabs outside any tab group
pub const TAB_GROUP_ID_NONE: i32 = -1;

/// A browser tab, as reported by `chrome.tabs` and as kept in the saved list
///
/// `closed_at` is only set on tabs the engine has wrangled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default)]
    pub window_id: i32,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub audible: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "no_group")]
    pub group_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
}

fn no_group() -> i32 {
    TAB_GROUP_ID_NONE
}

impl Tab {
    pub fn new(id: i32, url: &str, title: &str) -> Tab {
        Tab {
            id: Some(id),
            window_id: 0,
            index: 0,
            url: url.to_string(),
            title: title.to_string(),
            pinned: false,
            audible: false,
            active: false,
            group_id: TAB_GROUP_ID_NONE,
            fav_icon_url: None,
            session_id: None,
            closed_at: None,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id != TAB_GROUP_ID_NONE
    }

    /// Whether two saved-list entries describe the same wrangled tab
    pub fn same_saved_tab(&self, other: &Tab) -> bool {
        self.id == other.id && self.url == other.url && self.closed_at == other.closed_at
    }
}

/// A browser window and the tabs it contains
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub id: i32,
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

/// A saved tab paired with the position it occupied in the saved list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedTab {
    pub index: usize,
    pub tab: Tab,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_creation() {
        let tab = Tab::new(1, "https://google.com", "Google");

        assert_eq!(tab.id, Some(1));
        assert_eq!(tab.url, "https://google.com");
        assert_eq!(tab.title, "Google");
        assert!(!tab.pinned);
        assert!(!tab.is_grouped());
        assert_eq!(tab.closed_at, None);
    }

    #[test]
    fn test_deserialize_browser_shape() {
        let json = r#"{
            "id": 42,
            "windowId": 3,
            "index": 7,
            "url": "https://github.com/rust-lang/rust",
            "title": "Rust",
            "pinned": false,
            "audible": true,
            "active": false,
            "groupId": 12,
            "favIconUrl": "https://github.com/favicon.ico",
            "incognito": false
        }"#;

        let tab: Tab = serde_json::from_str(json).unwrap();

        assert_eq!(tab.id, Some(42));
        assert_eq!(tab.window_id, 3);
        assert!(tab.audible);
        assert!(tab.is_grouped());
        assert_eq!(tab.fav_icon_url.as_deref(), Some("https://github.com/favicon.ico"));
    }

    #[test]
    fn test_closed_at_serialized_camel_case() {
        let mut tab = Tab::new(5, "https://example.com", "Example");
        tab.closed_at = Some(1_698_508_200_000);

        let value = serde_json::to_value(&tab).unwrap();

        assert_eq!(value["closedAt"], 1_698_508_200_000_i64);
        assert_eq!(value["groupId"], -1);
        assert!(value.get("sessionId").is_none());
    }

    #[test]
    fn test_same_saved_tab() {
        let mut a = Tab::new(1, "https://a.com", "A");
        a.closed_at = Some(10);
        let mut b = a.clone();
        b.title = "renamed".to_string();
        assert!(a.same_saved_tab(&b));

        b.closed_at = Some(11);
        assert!(!a.same_saved_tab(&b));
    }
}
