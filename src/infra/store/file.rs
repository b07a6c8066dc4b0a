//! File-backed state store.
//!
//! The whole collection is written as one JSON document. Writes go to a
//! sibling temp file which is then renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact.

use std::collections::HashMap;
use std::fs::{self, create_dir_all, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{EngineError, PersistedState, StateStore};
use crate::util::serde::ActorId;

/// Default file name used by the fault manager.
pub const DEFAULT_STATE_FILE: &str = "agent_states.json";

/// JSON file store for persisted actor state.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store writing to `dir/file_name`. Creates `dir` if missing.
    pub fn new(dir: impl AsRef<Path>, file_name: &str) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        create_dir_all(dir).map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(Self {
            path: dir.join(file_name),
        })
    }

    /// Store writing to an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<HashMap<ActorId, PersistedState>, EngineError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| EngineError::Storage(e.to_string()))
    }

    fn save(&self, states: &HashMap<ActorId, PersistedState>) -> Result<(), EngineError> {
        let tmp = self.temp_path();
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, states)
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            writer.flush().map_err(|e| EngineError::Storage(e.to_string()))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| EngineError::Storage(e.to_string()))
    }
}
