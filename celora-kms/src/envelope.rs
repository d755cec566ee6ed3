//! Envelope encryption core
//!
//! Payloads are encrypted with per-version data encryption keys (DEKs);
//! each DEK is wrapped under the registry's master key. Rotation installs
//! a fresh DEK as the next version while older versions stay decryptable
//! until they are explicitly revoked.
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


use crate::error::{KmsError, KmsResult};
use crate::key_types::{
    EncryptionResult, ExecutionContext, KeyStatus, KeyVersion, RotationReason, RotationResult,
};
use crate::registry::{KeyRegistry, MasterKey, RotationSchedule};
use crate::schedule;
use crate::store::KeyVersionStore;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use chrono::Utc;
use rand::RngCore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// DEK length in bytes (AES-256)
const DEK_LEN: usize = 32;

/// Shared mutable key state, guarded by a single lock
///
/// Rotation and revocation take the write half; encrypt, decrypt, and the
/// read-only queries take the read half, so a rotation is never observed
/// half-applied.
#[derive(Default)]
struct KeyTable {
    versions: BTreeMap<u64, KeyVersion>,
    current_version: Option<u64>,
    /// Master keys seen at wrap time, by key id. A version wrapped under a
    /// master key the registry has since rotated away resolves through
    /// this cache.
    master_keys: HashMap<String, MasterKey>,
}

/// Envelope encryption service
pub struct EnvelopeKms {
    registry: Arc<dyn KeyRegistry>,
    store: Arc<dyn KeyVersionStore>,
    context: ExecutionContext,
    table: RwLock<KeyTable>,
}

impl EnvelopeKms {
    /// Create the service without touching key material
    pub fn new(
        registry: Arc<dyn KeyRegistry>,
        store: Arc<dyn KeyVersionStore>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            registry,
            store,
            context,
            table: RwLock::new(KeyTable::default()),
        }
    }

    /// Load persisted versions and bootstrap the first DEK
    ///
    /// Skipped entirely outside a server context. With no master key
    /// available the table stays empty and encrypt/rotate fail fast.
    pub async fn initialize(&self) -> KmsResult<()> {
        if !self.context.is_server() {
            warn!("Skipping KMS initialization outside server context");
            return Ok(());
        }

        let mut table = self.table.write().await;

        let loaded = self.store.load_versions().await?;
        if !loaded.is_empty() {
            for version in loaded {
                table.versions.insert(version.version, version);
            }
            table.current_version = table
                .versions
                .values()
                .find(|v| v.status == KeyStatus::Active)
                .map(|v| v.version);
            debug!(count = table.versions.len(), "Loaded key versions from store");
        }

        let master_key = match self.registry.get_active_master_key().await? {
            Some(mk) => mk,
            None => {
                warn!("No master key available from the key registry, key versions cannot be provisioned");
                return Ok(());
            }
        };

        table
            .master_keys
            .insert(master_key.key_id.clone(), master_key.clone());

        if table.versions.is_empty() {
            let version = Self::provision_version(1, &master_key)?;
            self.store.save_version(&version).await?;
            info!(key_id = %version.key_id, "Provisioned initial key version");
            table.current_version = Some(1);
            table.versions.insert(1, version);
        }

        Ok(())
    }

    /// Encrypt a payload under the active key version
    pub async fn encrypt(&self, plaintext: &str) -> KmsResult<EncryptionResult> {
        let table = self.table.read().await;
        let current = table.current_version.ok_or(KmsError::NoActiveKey)?;
        let version = table.versions.get(&current).ok_or(KmsError::NoActiveKey)?;

        let master_key = self.lookup_master_key(&table, &version.master_key_id).await?;
        let dek = Self::unwrap_dek(&version.wrapped_dek, &master_key)?;

        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| KmsError::Encryption(format!("Bad DEK length: {}", e)))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| KmsError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(EncryptionResult {
            ciphertext,
            key_version: version.version,
            algorithm: version.algorithm.clone(),
            iv: nonce.to_vec(),
        })
    }

    /// Decrypt a payload previously returned by [`encrypt`](Self::encrypt)
    pub async fn decrypt(&self, result: &EncryptionResult) -> KmsResult<String> {
        let table = self.table.read().await;
        let version = table
            .versions
            .get(&result.key_version)
            .ok_or(KmsError::KeyVersionNotFound(result.key_version))?;
        if version.status == KeyStatus::Revoked {
            return Err(KmsError::KeyRevoked(version.version));
        }

        let master_key = self.lookup_master_key(&table, &version.master_key_id).await?;
        let dek = Self::unwrap_dek(&version.wrapped_dek, &master_key)?;

        if result.iv.len() != NONCE_LEN {
            return Err(KmsError::Decryption(format!(
                "Invalid nonce length: {}",
                result.iv.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| KmsError::Decryption(format!("Bad DEK length: {}", e)))?;
        let nonce = Nonce::from_slice(&result.iv);
        let plaintext = cipher
            .decrypt(nonce, result.ciphertext.as_slice())
            .map_err(|_| KmsError::Decryption("Authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| KmsError::Decryption(format!("Invalid UTF-8 payload: {}", e)))
    }

    /// Rotate to a fresh key version
    ///
    /// The previous active version is marked deprecated and stays available
    /// for decryption. Atomic with respect to concurrent encrypt calls: a
    /// caller sees either the pre-rotation or post-rotation active version.
    pub async fn rotate_keys(&self, reason: RotationReason) -> KmsResult<RotationResult> {
        let mut table = self.table.write().await;

        let current = table.current_version.ok_or(KmsError::NoCurrentKey)?;
        let previous_key_id = table
            .versions
            .get(&current)
            .ok_or(KmsError::NoCurrentKey)?
            .key_id
            .clone();

        let master_key = self
            .registry
            .get_active_master_key()
            .await?
            .ok_or(KmsError::NoMasterKey)?;

        let new_version_num = current + 1;
        let new_version = Self::provision_version(new_version_num, &master_key)?;
        let rotated_at = new_version.created;

        self.store.save_version(&new_version).await?;

        table
            .master_keys
            .insert(master_key.key_id.clone(), master_key);

        if let Some(previous) = table.versions.get_mut(&current) {
            previous.status = KeyStatus::Deprecated;
            previous.rotated_at = Some(rotated_at);
            self.store.save_version(previous).await?;
        }

        let result = RotationResult {
            new_key_id: new_version.key_id.clone(),
            new_version: new_version_num,
            rotated_at,
            previous_key_id,
            reason,
        };

        table.current_version = Some(new_version_num);
        table.versions.insert(new_version_num, new_version);

        info!(
            new_key_id = %result.new_key_id,
            previous_key_id = %result.previous_key_id,
            reason = %reason,
            "Rotated encryption keys"
        );

        Ok(result)
    }

    /// Whether the rotation policy makes a rotation due now
    ///
    /// A missing current key always reports true so the bootstrap path is
    /// retried on the next check.
    pub async fn check_rotation_needed(&self) -> KmsResult<bool> {
        let anchor = {
            let table = self.table.read().await;
            match table.current_version.and_then(|v| table.versions.get(&v)) {
                Some(version) => version.rotated_at.unwrap_or(version.created),
                None => return Ok(true),
            }
        };

        let schedule = match self.registry.get_rotation_schedule().await? {
            Some(schedule) => schedule,
            None => return Ok(false),
        };

        Ok(schedule::is_rotation_due(&schedule, anchor, Utc::now()))
    }

    /// Out-of-schedule rotation for a configured security trigger
    pub async fn emergency_rotation(&self, trigger: &str) -> KmsResult<RotationResult> {
        let enabled = match self.registry.get_rotation_schedule().await? {
            Some(schedule) => {
                schedule.emergency.enabled
                    && schedule.emergency.triggers.iter().any(|t| t == trigger)
            }
            None => false,
        };
        if !enabled {
            return Err(KmsError::EmergencyRotationNotEnabled(trigger.to_string()));
        }

        warn!(trigger = trigger, "Emergency key rotation triggered");
        self.rotate_keys(RotationReason::Emergency).await
    }

    /// Mark a superseded key version as untrusted
    ///
    /// Payloads encrypted under a revoked version stop being decryptable.
    /// The active version must be rotated out before it can be revoked.
    pub async fn revoke_key_version(&self, version: u64, reason: &str) -> KmsResult<()> {
        let mut table = self.table.write().await;

        if table.current_version == Some(version) {
            return Err(KmsError::CannotRevokeActiveKey(version));
        }
        let entry = table
            .versions
            .get_mut(&version)
            .ok_or(KmsError::KeyVersionNotFound(version))?;

        entry.status = KeyStatus::Revoked;
        let key_id = entry.key_id.clone();
        self.store.save_version(entry).await?;

        warn!(key_id = %key_id, version, reason = reason, "Revoked key version");
        Ok(())
    }

    /// All key versions, newest first
    pub async fn get_key_version_history(&self) -> Vec<KeyVersion> {
        let table = self.table.read().await;
        table.versions.values().rev().cloned().collect()
    }

    /// Version number of the active key, if any
    pub async fn current_version(&self) -> Option<u64> {
        self.table.read().await.current_version
    }

    /// Rotation policy from the registry, if one is configured
    pub async fn rotation_schedule(&self) -> KmsResult<Option<RotationSchedule>> {
        self.registry.get_rotation_schedule().await
    }

    /// Execution context this service was constructed for
    pub fn execution_context(&self) -> ExecutionContext {
        self.context
    }

    /// Resolve the master key a version was wrapped under: wrap-time cache
    /// first, then the registry's active key when the id still matches.
    async fn lookup_master_key(&self, table: &KeyTable, key_id: &str) -> KmsResult<MasterKey> {
        if let Some(mk) = table.master_keys.get(key_id) {
            return Ok(mk.clone());
        }
        match self.registry.get_active_master_key().await? {
            Some(mk) if mk.key_id == key_id => Ok(mk),
            _ => Err(KmsError::NoMasterKey),
        }
    }

    /// Generate a fresh DEK and wrap it under the master key
    fn provision_version(version: u64, master_key: &MasterKey) -> KmsResult<KeyVersion> {
        let mut dek = [0u8; DEK_LEN];
        rand::thread_rng().fill_bytes(&mut dek);
        let wrapped = Self::wrap_dek(&dek, master_key)?;
        Ok(KeyVersion::new(version, &master_key.key_id, wrapped))
    }

    /// Wrap a DEK under the master key, nonce-prefixed
    fn wrap_dek(dek: &[u8], master_key: &MasterKey) -> KmsResult<Vec<u8>> {
        let cipher = Aes256Gcm::new(master_key.secret().into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, dek)
            .map_err(|e| KmsError::Encryption(format!("DEK wrap failed: {}", e)))?;

        let mut wrapped = nonce.to_vec();
        wrapped.extend_from_slice(&ciphertext);
        Ok(wrapped)
    }

    /// Recover a DEK from its nonce-prefixed wrapped form
    fn unwrap_dek(wrapped: &[u8], master_key: &MasterKey) -> KmsResult<Vec<u8>> {
        if wrapped.len() < NONCE_LEN {
            return Err(KmsError::Decryption("Wrapped DEK too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(master_key.secret().into());

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| KmsError::Decryption(format!("DEK unwrap failed: {}", e)))
    }
}
