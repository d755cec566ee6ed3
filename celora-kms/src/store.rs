//! Key-version persistence interface
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
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable storage for key versions
///
/// The envelope core owns the authoritative in-memory table and writes
/// through on every mutation; a store only has to hand back what it was
/// given, in any order.
#[async_trait]
pub trait KeyVersionStore: Send + Sync {
    /// Load every persisted key version
    async fn load_versions(&self) -> KmsResult<Vec<KeyVersion>>;

    /// Persist one key version, replacing any previous record of it
    async fn save_version(&self, version: &KeyVersion) -> KmsResult<()>;
}

/// Process-lifetime store
#[derive(Default)]
pub struct MemoryVersionStore {
    versions: RwLock<HashMap<u64, KeyVersion>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyVersionStore for MemoryVersionStore {
    async fn load_versions(&self) -> KmsResult<Vec<KeyVersion>> {
        let versions = self.versions.read().await;
        Ok(versions.values().cloned().collect())
    }

    async fn save_version(&self, version: &KeyVersion) -> KmsResult<()> {
        let mut versions = self.versions.write().await;
        versions.insert(version.version, version.clone());
        Ok(())
    }
}
