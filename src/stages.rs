//! Downstream collaborators run after a successful collection.
//!
//! Each configured stage is an external command (the analyzer that writes a
//! summary, the voice generator that reads it back). Stages run one after
//! another with `--market <CODE>` appended; the first failure stops the
//! chain.

use crate::config::StageConfig;
use crate::error::HuntError;
use crate::models::Market;
use crate::utils::truncate_for_log;
use std::time::Instant;
use tokio::process::Command;
use tracing::{error, info, instrument};

/// Run every stage in order for `market`.
#[instrument(level = "info", skip(stages), fields(count = stages.len()))]
pub async fn run_all(stages: &[StageConfig], market: Market) -> Result<(), HuntError> {
    for stage in stages {
        run_stage(stage, market).await?;
    }
    Ok(())
}

async fn run_stage(stage: &StageConfig, market: Market) -> Result<(), HuntError> {
    let failed = |reason: String| {
        error!(stage = %stage.name, %reason, "Stage failed");
        HuntError::StageFailed {
            stage: stage.name.clone(),
            reason,
        }
    };

    let Some((program, args)) = stage.command.split_first() else {
        return Err(failed("empty command".to_string()));
    };

    info!(stage = %stage.name, program, "Starting stage");
    let started = Instant::now();
    let output = Command::new(program)
        .args(args)
        .arg("--market")
        .arg(market.code())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| failed(format!("could not start {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!(
            "{}; stderr: {}",
            output.status,
            truncate_for_log(stderr.trim(), 500)
        )));
    }

    info!(
        stage = %stage.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Stage completed"
    );
    Ok(())
}
