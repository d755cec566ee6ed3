//! Key Management System for Celora
//!
//! Versioned envelope encryption with scheduled, manual, and emergency key
//! rotation. Payloads are encrypted under per-version data encryption keys
//! (DEKs); each DEK is wrapped under a registry-provided master key. Data
//! encrypted under any retained version stays decryptable until that
//! version is revoked.
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


pub mod envelope;
pub mod error;
pub mod key_types;
pub mod local_store;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod service_integration;
pub mod store;

pub use envelope::EnvelopeKms;
pub use error::{KmsError, KmsResult};
pub use key_types::{
    EncryptionResult, ExecutionContext, KeyStatus, KeyVersion, RotationEvent, RotationReason,
    RotationResult, SchedulerStatus,
};
pub use local_store::LocalVersionStore;
pub use registry::{EnvKeyRegistry, KeyRegistry, MasterKey, RotationSchedule, StaticKeyRegistry};
pub use scheduler::RotationScheduler;
pub use service_integration::*;
pub use store::{KeyVersionStore, MemoryVersionStore};
