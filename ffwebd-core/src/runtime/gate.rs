//! Pre-execution admission control against live host telemetry.
//!
//! The gate is advisory: concurrent jobs may race through it, and a
//! signal that cannot be sampled never rejects a job. The concurrency
//! semaphore remains the hard bound.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Disks, System};
use tracing::warn;

use crate::runtime::types::TaskError;

/// Thresholds for the resource gate.
///
/// Zero thresholds are never breached, so a zeroed config effectively
/// disables the corresponding signal.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum idle CPU percentage required to admit a job.
    pub throttle_cpu: f64,
    /// Minimum available system memory, in bytes.
    pub throttle_free_mem: u64,
    /// Minimum free space on the filesystem hosting the temp root.
    pub throttle_free_disk: u64,
    /// CPU sampling window. The default of one second trades admission
    /// latency for a usable load estimate.
    pub cpu_sample_window: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            throttle_cpu: 0.0,
            throttle_free_mem: 0,
            throttle_free_disk: 0,
            cpu_sample_window: Duration::from_secs(1),
        }
    }
}

/// Samples CPU, memory, and disk and decides whether a job may start.
#[derive(Debug, Clone)]
pub struct ResourceGate {
    cfg: GateConfig,
    temp_root: PathBuf,
}

impl ResourceGate {
    pub fn new(cfg: GateConfig, temp_root: PathBuf) -> Self {
        Self { cfg, temp_root }
    }

    /// Admit or reject a job based on current host telemetry.
    ///
    /// Sampling runs on the blocking pool because the CPU probe sleeps
    /// for the sampling window. Sampler failures are logged and treated
    /// as "signal unavailable": only a measured breach rejects.
    pub async fn admit(&self) -> Result<(), TaskError> {
        let cfg = self.cfg.clone();
        let temp_root = self.temp_root.clone();
        match tokio::task::spawn_blocking(move || sample(&cfg, &temp_root)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "resource sampler task failed; admitting");
                Ok(())
            }
        }
    }
}

fn sample(cfg: &GateConfig, temp_root: &Path) -> Result<(), TaskError> {
    let mut sys = System::new();

    // CPU usage is a delta between two refreshes over the window.
    sys.refresh_cpu_usage();
    std::thread::sleep(cfg.cpu_sample_window);
    sys.refresh_cpu_usage();
    if sys.cpus().is_empty() {
        warn!("could not sample CPU usage; skipping CPU check");
    } else {
        let usage = sys.global_cpu_usage() as f64;
        if usage > 100.0 - cfg.throttle_cpu {
            return Err(TaskError::ResourceExhausted(format!(
                "not enough idle CPU. Current usage: {usage:.2}%, idle threshold: {:.2}%",
                cfg.throttle_cpu
            )));
        }
    }

    sys.refresh_memory();
    if sys.total_memory() == 0 {
        warn!("could not sample memory usage; skipping memory check");
    } else {
        let available = sys.available_memory();
        if available < cfg.throttle_free_mem {
            return Err(TaskError::ResourceExhausted(format!(
                "not enough free memory. Available: {available}, required: {}",
                cfg.throttle_free_mem
            )));
        }
    }

    let disks = Disks::new_with_refreshed_list();
    let hosting = disks
        .iter()
        .filter(|d| temp_root.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());
    match hosting {
        None => warn!(
            temp_root = %temp_root.display(),
            "no mounted disk matches the temp root; skipping disk check"
        ),
        Some(disk) => {
            let free = disk.available_space();
            if free < cfg.throttle_free_disk {
                return Err(TaskError::ResourceExhausted(format!(
                    "not enough free disk space. Available: {free}, required: {}",
                    cfg.throttle_free_disk
                )));
            }
        }
    }

    Ok(())
}
