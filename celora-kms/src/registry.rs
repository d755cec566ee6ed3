//! Key registry interface: master key material and rotation policy
//!
//! The registry is an external, read-only collaborator. It owns the
//! long-lived master key and the rotation schedule; this service only
//! consumes them.
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
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::warn;

/// Raw master key material
pub type MasterKeyBytes = [u8; 32];

/// Long-lived master key, used only to wrap and unwrap DEKs
///
/// The secret is genuine key material supplied by the registry, never
/// derived from the public identifier.
#[derive(Clone)]
pub struct MasterKey {
    pub key_id: String,
    pub created: DateTime<Utc>,
    secret: MasterKeyBytes,
}

impl MasterKey {
    pub fn new(key_id: impl Into<String>, secret: MasterKeyBytes) -> Self {
        Self {
            key_id: key_id.into(),
            created: Utc::now(),
            secret,
        }
    }

    pub fn secret(&self) -> &MasterKeyBytes {
        &self.secret
    }
}

// Keep the secret out of logs and debug output.
impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key_id", &self.key_id)
            .field("created", &self.created)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Daily rotation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRotation {
    pub enabled: bool,
    /// Wall-clock time of day the rotation becomes due
    pub time: NaiveTime,
}

/// Weekly rotation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyRotation {
    pub enabled: bool,
    pub day: Weekday,
    pub time: NaiveTime,
}

/// Emergency rotation policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyRotation {
    pub enabled: bool,
    /// Security signals that justify an out-of-schedule rotation
    pub triggers: Vec<String>,
}

/// Rotation policy configuration, read-only to this service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSchedule {
    pub daily: DailyRotation,
    pub weekly: WeeklyRotation,
    pub emergency: EmergencyRotation,
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self {
            daily: DailyRotation {
                enabled: false,
                time: NaiveTime::from_hms_opt(2, 0, 0).expect("valid time"),
            },
            weekly: WeeklyRotation {
                enabled: false,
                day: Weekday::Sun,
                time: NaiveTime::from_hms_opt(3, 0, 0).expect("valid time"),
            },
            emergency: EmergencyRotation::default(),
        }
    }
}

/// Read-only provider of master key material and rotation policy
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Currently active master key, if the registry holds one
    async fn get_active_master_key(&self) -> KmsResult<Option<MasterKey>>;

    /// Rotation policy configuration, if one is configured
    async fn get_rotation_schedule(&self) -> KmsResult<Option<RotationSchedule>>;
}

/// Registry backed by environment variables
///
/// Master key resolution order:
/// 1. `CELORA_MASTER_KEY` as 64 hex characters (32 bytes)
/// 2. `CELORA_MASTER_KEY` as an arbitrary secret string, stretched with SHA-256
/// 3. generated at startup with a warning
pub struct EnvKeyRegistry {
    master_key: Option<MasterKey>,
    schedule: Option<RotationSchedule>,
}

impl EnvKeyRegistry {
    pub fn new(
        master_key_id: impl Into<String>,
        schedule: Option<RotationSchedule>,
    ) -> KmsResult<Self> {
        let secret = Self::derive_master_secret()?;
        Ok(Self {
            master_key: Some(MasterKey::new(master_key_id, secret)),
            schedule,
        })
    }

    /// Derive master key material from the environment or generate it
    fn derive_master_secret() -> KmsResult<MasterKeyBytes> {
        if let Ok(key_str) = std::env::var("CELORA_MASTER_KEY") {
            // If it's a hex string, decode it
            if let Ok(key_bytes) = hex::decode(&key_str) {
                if key_bytes.len() == 32 {
                    let mut mk = [0u8; 32];
                    mk.copy_from_slice(&key_bytes);
                    return Ok(mk);
                }
            }
            // Otherwise, derive from the secret string using SHA256
            let hash = Sha256::digest(key_str.as_bytes());
            let mut mk = [0u8; 32];
            mk.copy_from_slice(&hash);
            return Ok(mk);
        }

        warn!("No CELORA_MASTER_KEY found, generating a new one. This should be set in production!");
        let mut mk = [0u8; 32];
        use rand::RngCore;
        rand::thread_rng().fill_bytes(&mut mk);
        Ok(mk)
    }
}

#[async_trait]
impl KeyRegistry for EnvKeyRegistry {
    async fn get_active_master_key(&self) -> KmsResult<Option<MasterKey>> {
        Ok(self.master_key.clone())
    }

    async fn get_rotation_schedule(&self) -> KmsResult<Option<RotationSchedule>> {
        Ok(self.schedule.clone())
    }
}

/// In-memory registry for tests and embedders
///
/// The master key can be swapped at runtime to mimic an upstream registry
/// rotating its key material.
pub struct StaticKeyRegistry {
    master_key: RwLock<Option<MasterKey>>,
    schedule: RwLock<Option<RotationSchedule>>,
}

impl StaticKeyRegistry {
    pub fn new(master_key: Option<MasterKey>, schedule: Option<RotationSchedule>) -> Self {
        Self {
            master_key: RwLock::new(master_key),
            schedule: RwLock::new(schedule),
        }
    }

    /// Replace the active master key, as an upstream rotation would
    pub async fn set_master_key(&self, master_key: Option<MasterKey>) {
        *self.master_key.write().await = master_key;
    }

    pub async fn set_schedule(&self, schedule: Option<RotationSchedule>) {
        *self.schedule.write().await = schedule;
    }
}

#[async_trait]
impl KeyRegistry for StaticKeyRegistry {
    async fn get_active_master_key(&self) -> KmsResult<Option<MasterKey>> {
        Ok(self.master_key.read().await.clone())
    }

    async fn get_rotation_schedule(&self) -> KmsResult<Option<RotationSchedule>> {
        Ok(self.schedule.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_debug_redacts_secret() {
        let mk = MasterKey::new("mk-test", [7u8; 32]);
        let rendered = format!("{:?}", mk);
        assert!(rendered.contains("mk-test"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("7, 7"));
    }

    #[tokio::test]
    async fn test_static_registry_swaps_master_key() {
        let registry = StaticKeyRegistry::new(Some(MasterKey::new("mk-1", [1u8; 32])), None);

        let first = registry.get_active_master_key().await.unwrap().unwrap();
        assert_eq!(first.key_id, "mk-1");

        registry
            .set_master_key(Some(MasterKey::new("mk-2", [2u8; 32])))
            .await;
        let second = registry.get_active_master_key().await.unwrap().unwrap();
        assert_eq!(second.key_id, "mk-2");
    }
}
