//! File-backed key-version storage
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::KmsResult;
use crate::key_types::KeyVersion;
use crate::store::KeyVersionStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Key versions stored as one JSON document per version
///
/// Only the wrapped DEK ever touches disk; unwrapping still requires the
/// registry's master key.
pub struct LocalVersionStore {
    storage_path: PathBuf,
}

impl LocalVersionStore {
    /// Create the store, creating the storage directory if needed
    pub async fn new<P: AsRef<Path>>(storage_path: P) -> KmsResult<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();
        fs::create_dir_all(&storage_path).await?;
        Ok(Self { storage_path })
    }

    fn version_path(&self, version: u64) -> PathBuf {
        self.storage_path.join(format!("v{}.json", version))
    }
}

#[async_trait]
impl KeyVersionStore for LocalVersionStore {
    async fn load_versions(&self) -> KmsResult<Vec<KeyVersion>> {
        let mut versions = Vec::new();

        let mut entries = fs::read_dir(&self.storage_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<KeyVersion>(&content) {
                    Ok(version) => versions.push(version),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to parse key version record");
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read key version record");
                }
            }
        }

        debug!(count = versions.len(), "Loaded key versions from disk");
        Ok(versions)
    }

    async fn save_version(&self, version: &KeyVersion) -> KmsResult<()> {
        let path = self.version_path(version.version);
        let json = serde_json::to_string_pretty(version)?;
        fs::write(&path, json).await?;
        Ok(())
    }
}
