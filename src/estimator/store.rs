use crate::estimator::DeviceEstimators;
use crate::prelude::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Persists every device's estimators as one JSON document keyed by device
/// name.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store.
    pub fn load(&self) -> Result<HashMap<String, DeviceEstimators>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {}", self.path.display());
                return Ok(HashMap::new());
            }
            Err(err) => bail!("Error reading state file {}: {}", self.path.display(), err),
        };

        serde_json::from_str(&content)
            .map_err(|err| anyhow!("Error parsing state file {}: {}", self.path.display(), err))
    }

    /// Written through a sibling `.tmp` file renamed into place.
    pub fn save(&self, state: &HashMap<String, DeviceEstimators>) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)
            .map_err(|err| anyhow!("Error writing {}: {}", tmp.display(), err))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|err| anyhow!("Error replacing {}: {}", self.path.display(), err))?;

        trace!("saved state for {} devices", state.len());
        Ok(())
    }
}
