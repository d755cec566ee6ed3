//! Error types for the key management service
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


use thiserror::Error;

/// Key management errors
#[derive(Error, Debug)]
pub enum KmsError {
    #[error("No active key version available")]
    NoActiveKey,

    #[error("No current key version to rotate")]
    NoCurrentKey,

    #[error("No master key available from the key registry")]
    NoMasterKey,

    #[error("Key version not found: {0}")]
    KeyVersionNotFound(u64),

    #[error("Key version revoked: {0}")]
    KeyRevoked(u64),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Cannot revoke the active key version: {0}")]
    CannotRevokeActiveKey(u64),

    #[error("Emergency rotation not enabled for trigger: {0}")]
    EmergencyRotationNotEnabled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for key management operations
pub type KmsResult<T> = Result<T, KmsError>;
