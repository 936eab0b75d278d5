//! JSON file store shared by the plugins.
//!
//! The whole state is loaded into memory on open and rewritten to disk on
//! every mutation. A mutation runs against a copy of the state while the
//! lock is held; the copy only replaces the live state once it has been
//! flushed, so a failed write leaves both memory and disk unchanged.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PluginError;

pub struct JsonStore<T> {
    /// `None` keeps the state in memory only
    path: Option<PathBuf>,
    state: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send,
{
    /// Open the store at `path`, starting from `initial` if the file does not exist.
    pub fn open(path: impl Into<PathBuf>, initial: T) -> Result<Self, PluginError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                PluginError::Storage(format!("Failed to parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => initial,
            Err(e) => {
                return Err(PluginError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        debug!(path = %path.display(), "JSON store opened");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(initial: T) -> Self {
        Self {
            path: None,
            state: Mutex::new(initial),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the current state.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Mutate the state and persist it.
    ///
    /// The lock is held across the mutation and the flush, so writers are
    /// serialised.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, PluginError>,
    ) -> Result<R, PluginError> {
        let mut state = self.state.lock().await;
        let mut draft = state.clone();
        let out = f(&mut draft)?;
        self.flush(&draft).await?;
        *state = draft;
        Ok(out)
    }

    async fn flush(&self, state: &T) -> Result<(), PluginError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PluginError::Storage(format!("Failed to create data directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| PluginError::Storage(format!("Failed to serialize state: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| PluginError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| PluginError::Storage(format!("Failed to replace {}: {e}", path.display())))?;
        Ok(())
    }
}
