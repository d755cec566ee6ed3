//! Rotation scheduler
//!
//! Drives scheduled key rotation on a timer, with manual and emergency
//! entry points and a bounded audit trail of rotation events.
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
use crate::key_types::{RotationEvent, RotationReason, RotationResult, SchedulerStatus};
use crate::schedule;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default cadence for scheduled rotation checks
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 60_000;

/// Number of audit trail entries retained
const ROTATION_HISTORY_LIMIT: usize = 100;

/// Periodic driver for key rotation
pub struct RotationScheduler {
    kms: Arc<EnvelopeKms>,
    check_interval: Duration,
    running: Arc<AtomicBool>,
    timer: Mutex<Option<JoinHandle<()>>>,
    history: Arc<RwLock<Vec<RotationEvent>>>,
    /// Single-slot gate: a tick that fires while a rotation is still in
    /// flight is skipped instead of racing it.
    rotation_gate: Arc<Mutex<()>>,
}

impl RotationScheduler {
    pub fn new(kms: Arc<EnvelopeKms>) -> Self {
        Self::with_interval(kms, Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS))
    }

    pub fn with_interval(kms: Arc<EnvelopeKms>, check_interval: Duration) -> Self {
        Self {
            kms,
            check_interval,
            running: Arc::new(AtomicBool::new(false)),
            timer: Mutex::new(None),
            history: Arc::new(RwLock::new(Vec::new())),
            rotation_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Start the rotation timer
    ///
    /// A no-op with a warning when already running or outside a server
    /// context.
    pub async fn start(&self) {
        if !self.kms.execution_context().is_server() {
            warn!("Rotation scheduler only runs in a server context");
            return;
        }

        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            warn!("Rotation scheduler already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);

        let kms = Arc::clone(&self.kms);
        let running = Arc::clone(&self.running);
        let history = Arc::clone(&self.history);
        let gate = Arc::clone(&self.rotation_gate);
        let check_interval = self.check_interval;

        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately; skip it so starting the
            // scheduler does not rotate right away.
            ticker.tick().await;
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                Self::check_and_rotate(&kms, &history, &gate).await;
            }
        }));

        info!(
            check_interval_ms = check_interval.as_millis() as u64,
            "Rotation scheduler started"
        );
    }

    /// Stop the rotation timer
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut timer = self.timer.lock().await;
        if let Some(handle) = timer.take() {
            handle.abort();
            info!("Rotation scheduler stopped");
        }
    }

    /// Rotate now, outside the schedule
    ///
    /// Unlike the timer path, failures propagate to the caller.
    pub async fn manual_rotation(&self) -> KmsResult<RotationResult> {
        let _in_flight = self.rotation_gate.lock().await;
        let result = self.kms.rotate_keys(RotationReason::Manual).await?;
        Self::record_event(&self.history, RotationReason::Manual, None, result.clone()).await;
        Ok(result)
    }

    /// Rotate if any of `signals` matches a configured emergency trigger
    ///
    /// The first matching signal, in input order, becomes the recorded
    /// trigger. Returns false without side effects when nothing matches.
    pub async fn check_emergency_triggers(&self, signals: &[String]) -> KmsResult<bool> {
        let schedule = match self.kms.rotation_schedule().await? {
            Some(schedule) => schedule,
            None => return Ok(false),
        };
        let Some(trigger) = schedule::first_matching_trigger(&schedule, signals) else {
            return Ok(false);
        };
        let trigger = trigger.to_string();

        let _in_flight = self.rotation_gate.lock().await;
        let result = self.kms.emergency_rotation(&trigger).await?;
        Self::record_event(
            &self.history,
            RotationReason::Emergency,
            Some(trigger),
            result,
        )
        .await;
        Ok(true)
    }

    /// Scheduler state snapshot
    pub async fn get_status(&self) -> SchedulerStatus {
        let history = self.history.read().await;
        SchedulerStatus {
            is_running: self.running.load(Ordering::SeqCst),
            check_interval_ms: self.check_interval.as_millis() as u64,
            last_check: history.last().map(|e| e.timestamp),
            total_rotations: history.len(),
        }
    }

    /// Audit trail, newest first
    pub async fn get_rotation_history(&self) -> Vec<RotationEvent> {
        let history = self.history.read().await;
        history.iter().rev().cloned().collect()
    }

    /// One scheduled check: rotate if the policy says so
    ///
    /// All failures are logged and swallowed; a missed scheduled rotation
    /// is retried on the next tick.
    async fn check_and_rotate(
        kms: &EnvelopeKms,
        history: &RwLock<Vec<RotationEvent>>,
        gate: &Mutex<()>,
    ) {
        let Ok(_in_flight) = gate.try_lock() else {
            debug!("Rotation still in flight, skipping tick");
            return;
        };

        let needed = match kms.check_rotation_needed().await {
            Ok(needed) => needed,
            Err(e) => {
                warn!(error = %e, "Rotation check failed");
                return;
            }
        };
        if !needed {
            return;
        }

        match kms.rotate_keys(RotationReason::Scheduled).await {
            Ok(result) => {
                Self::record_event(history, RotationReason::Scheduled, None, result).await;
            }
            Err(e) => {
                warn!(error = %e, "Scheduled rotation failed, deferring to next tick");
            }
        }
    }

    async fn record_event(
        history: &RwLock<Vec<RotationEvent>>,
        reason: RotationReason,
        trigger: Option<String>,
        result: RotationResult,
    ) {
        let mut history = history.write().await;
        history.push(RotationEvent {
            timestamp: Utc::now(),
            reason,
            trigger,
            result,
        });
        // Bounded trail: drop the oldest entries beyond the limit.
        if history.len() > ROTATION_HISTORY_LIMIT {
            let excess = history.len() - ROTATION_HISTORY_LIMIT;
            history.drain(..excess);
        }
    }
}
