//! Backup files: the saved list and counters as one JSON document.

use chrono::NaiveDate;
use log::info;
use serde_json::Value;

use crate::error::ImportError;
use crate::storage::{LocalState, StorageArea, Store};

/// `TabWranglerExport-YYYY-MM-DD.json` for the given date
pub fn export_file_name(date: NaiveDate) -> String {
    format!("TabWranglerExport-{}.json", date.format("%Y-%m-%d"))
}

/// File name for an export made today, in local time
pub fn export_file_name_today() -> String {
    export_file_name(chrono::Local::now().date_naive())
}

/// Serialize the saved list and counters
pub async fn export_data<S: StorageArea>(store: &Store<S>) -> Result<String, ImportError> {
    let state = store.load_state().await?;
    Ok(serde_json::to_string(&state)?)
}

/// Parse and check a backup without touching storage
pub fn parse_backup(text: &str) -> Result<LocalState, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = value else {
        return Err(ImportError::InvalidBackup("expected a JSON object".to_string()));
    };

    if fields.len() < LocalState::KEYS.len() {
        return Err(ImportError::InvalidBackup(format!(
            "expected {} keys, found {}",
            LocalState::KEYS.len(),
            fields.len()
        )));
    }
    if let Some(missing) = LocalState::KEYS.iter().find(|key| !fields.contains_key(**key)) {
        return Err(ImportError::InvalidBackup(format!("missing '{missing}'")));
    }

    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Replace the saved list and counters with a backup
///
/// The new state is fully built before the single write, so a rejected
/// backup leaves storage untouched.
pub async fn import_data<S: StorageArea>(store: &Store<S>, text: &str) -> Result<(), ImportError> {
    let state = parse_backup(text)?;
    store.replace_state(&state).await?;
    info!("Imported {} saved tab(s)", state.saved_tabs.len());
    Ok(())
}
