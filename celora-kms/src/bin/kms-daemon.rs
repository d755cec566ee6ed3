//! Celora KMS daemon
//!
//! Runs the envelope encryption service with the rotation scheduler and
//! keeps rotating keys on schedule until stopped.

use anyhow::Result;
use celora_config::AppConfig;
use celora_kms::registry::{
    DailyRotation, EmergencyRotation, RotationSchedule, WeeklyRotation,
};
use celora_kms::service_integration::init_kms;
use celora_kms::ExecutionContext;
use celora_logging::init_console_logging;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

fn schedule_from_config(config: &AppConfig) -> Option<RotationSchedule> {
    let rotation = config.rotation.as_ref()?;
    Some(RotationSchedule {
        daily: DailyRotation {
            enabled: rotation.daily_enabled,
            time: rotation.daily_time,
        },
        weekly: WeeklyRotation {
            enabled: rotation.weekly_enabled,
            day: rotation.weekly_day,
            time: rotation.weekly_time,
        },
        emergency: EmergencyRotation {
            enabled: rotation.emergency_enabled,
            triggers: rotation.emergency_triggers.clone(),
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_console_logging("celora-kms", "info");

    info!("Starting Celora KMS daemon");

    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let context = if config.server_context {
        ExecutionContext::Server
    } else {
        ExecutionContext::Client
    };

    let (kms, scheduler) = init_kms(
        config.master_key_id(),
        schedule_from_config(&config),
        config.key_storage_path.as_deref(),
        Duration::from_millis(config.check_interval_ms),
        context,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to initialize KMS: {}", e))?;

    info!(
        current_version = ?kms.current_version().await,
        "KMS initialized"
    );

    scheduler.start().await;

    // Wait for shutdown signal
    info!("Celora KMS daemon running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    scheduler.stop().await;
    info!("Celora KMS daemon stopped");

    Ok(())
}
