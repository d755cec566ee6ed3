//! Service wiring helpers for embedding the KMS
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


use crate::envelope::EnvelopeKms;
use crate::error::KmsResult;
use crate::key_types::ExecutionContext;
use crate::local_store::LocalVersionStore;
use crate::registry::{EnvKeyRegistry, KeyRegistry, RotationSchedule};
use crate::scheduler::RotationScheduler;
use crate::store::{KeyVersionStore, MemoryVersionStore};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build a fully wired KMS and rotation scheduler
///
/// `storage_path` selects the file-backed store; without one (and without
/// `KEY_STORAGE_PATH` in the environment) key versions live in process
/// memory only.
pub async fn init_kms(
    master_key_id: &str,
    schedule: Option<RotationSchedule>,
    storage_path: Option<&str>,
    check_interval: Duration,
    context: ExecutionContext,
) -> KmsResult<(Arc<EnvelopeKms>, RotationScheduler)> {
    let registry: Arc<dyn KeyRegistry> = Arc::new(EnvKeyRegistry::new(master_key_id, schedule)?);

    let path = storage_path
        .map(|p| p.to_string())
        .or_else(|| env::var("KEY_STORAGE_PATH").ok());
    let store: Arc<dyn KeyVersionStore> = match path {
        Some(path) => {
            info!(path = %path, "Using file-backed key version store");
            Arc::new(LocalVersionStore::new(&path).await?)
        }
        None => Arc::new(MemoryVersionStore::new()),
    };

    let kms = Arc::new(EnvelopeKms::new(registry, store, context));
    kms.initialize().await?;

    let scheduler = RotationScheduler::with_interval(Arc::clone(&kms), check_interval);
    Ok((kms, scheduler))
}
