use crate::analysis::StateMap;
use crate::errors::{MonitorError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// STATE STORE

/// Whole-snapshot JSON persistence for the tracked asset map.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted map. A missing or blank file yields an empty map;
    /// only unreadable or malformed content is an error.
    pub async fn load(&self) -> Result<StateMap> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = ?self.path, "State file not found, starting with empty state");
                return Ok(StateMap::new());
            }
            Err(e) => return Err(MonitorError::state_load(&self.path, e)),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(StateMap::new());
        }

        let state: StateMap =
            serde_json::from_slice(&content).map_err(|e| MonitorError::state_load(&self.path, e))?;
        info!(path = ?self.path, count = state.len(), "Loaded tracked assets");
        Ok(state)
    }

    /// Writes the full map. The file is replaced via a `.tmp` sibling and a
    /// rename, so a crash mid-write leaves the previous snapshot intact.
    pub async fn save(&self, state: &StateMap) -> Result<()> {
        let json_bytes =
            serde_json::to_vec_pretty(state).map_err(|e| MonitorError::state_save(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MonitorError::state_save(&self.path, e))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, json_bytes)
            .await
            .map_err(|e| MonitorError::state_save(&self.path, e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| MonitorError::state_save(&self.path, e))?;

        info!(path = ?self.path, count = state.len(), "Saved tracked assets");
        Ok(())
    }
}
