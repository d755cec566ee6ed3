//! Key lifecycle and rotation type definitions
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AEAD algorithm used for payloads and key wrapping
pub const AES_256_GCM: &str = "aes-256-gcm";

/// Execution context the service runs in
///
/// Key material is only ever handled server-side. In a client context the
/// KMS initializes with no key versions and the scheduler refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    Server,
    Client,
}

impl ExecutionContext {
    pub fn is_server(&self) -> bool {
        matches!(self, ExecutionContext::Server)
    }
}

/// Lifecycle status of a key version
///
/// Transitions are one-way: Active -> Deprecated via rotation,
/// Deprecated -> Revoked via explicit revocation. Revoked is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// The version new payloads are encrypted under
    Active,
    /// Superseded by rotation, still valid for decryption
    Deprecated,
    /// Untrusted, decryption refused
    Revoked,
}

/// One generation of a data encryption key plus its lifecycle metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVersion {
    /// Version number (monotonically increasing, starts at 1)
    pub version: u64,
    /// Derived label, `{master_key_id}-v{version}`
    pub key_id: String,
    /// AEAD algorithm this version encrypts with
    pub algorithm: String,
    /// When this version was created
    pub created: DateTime<Utc>,
    /// When this version was superseded by rotation
    pub rotated_at: Option<DateTime<Utc>>,
    /// Lifecycle status
    pub status: KeyStatus,
    /// DEK wrapped under the master key, nonce-prefixed
    pub wrapped_dek: Vec<u8>,
    /// Identifier of the master key the DEK is wrapped under
    pub master_key_id: String,
}

impl KeyVersion {
    pub fn new(version: u64, master_key_id: &str, wrapped_dek: Vec<u8>) -> Self {
        Self {
            version,
            key_id: format!("{}-v{}", master_key_id, version),
            algorithm: AES_256_GCM.to_string(),
            created: Utc::now(),
            rotated_at: None,
            status: KeyStatus::Active,
            wrapped_dek,
            master_key_id: master_key_id.to_string(),
        }
    }
}

/// Result of an encrypt call, persisted by the caller
///
/// Self-describing for decryption: these four fields are the complete
/// contract callers must store alongside nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionResult {
    /// Ciphertext with the authentication tag appended
    pub ciphertext: Vec<u8>,
    /// Key version the payload was encrypted under
    pub key_version: u64,
    /// AEAD algorithm
    pub algorithm: String,
    /// Nonce used for this payload
    pub iv: Vec<u8>,
}

/// Why a rotation happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    Scheduled,
    Emergency,
    Manual,
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RotationReason::Scheduled => "scheduled",
            RotationReason::Emergency => "emergency",
            RotationReason::Manual => "manual",
        })
    }
}

/// Outcome of a successful rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationResult {
    pub new_key_id: String,
    pub new_version: u64,
    pub rotated_at: DateTime<Utc>,
    pub previous_key_id: String,
    pub reason: RotationReason,
}

/// Audit trail entry, appended on every successful rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEvent {
    pub timestamp: DateTime<Utc>,
    pub reason: RotationReason,
    /// Emergency cause, when the rotation was trigger-driven
    pub trigger: Option<String>,
    pub result: RotationResult,
}

/// Scheduler state snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub check_interval_ms: u64,
    /// Timestamp of the most recent rotation event, if any
    pub last_check: Option<DateTime<Utc>>,
    pub total_rotations: usize,
}
