//! Compute backend detection
//!
//! Probed once per process. Models receive the result explicitly instead of
//! checking for optional hardware on their own.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::Serialize;

/// Environment variable that forces the CPU path
pub const FORCE_CPU_ENV: &str = "ROISEG_FORCE_CPU";

/// Device nodes exposed by common GPU compute drivers
const COMPUTE_NODES: &[&str] = &["/dev/nvidia0", "/dev/kfd"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ComputeBackend {
    /// A GPU render or compute node is available
    Accelerated,
    /// Plain CPU execution
    Fallback,
}

impl ComputeBackend {
    pub fn name(&self) -> &'static str {
        match self {
            ComputeBackend::Accelerated => "accelerated",
            ComputeBackend::Fallback => "cpu",
        }
    }

    /// Probe result for this process, computed on first call
    pub fn detect() -> Self {
        static DETECTED: OnceLock<ComputeBackend> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            let backend = probe();
            log::info!("Compute backend: {}", backend.name());
            backend
        })
    }

    /// Backend a model should use given the operator's CPU override
    pub fn select(use_cpu: bool) -> Self {
        if use_cpu {
            ComputeBackend::Fallback
        } else {
            Self::detect()
        }
    }
}

fn probe() -> ComputeBackend {
    if std::env::var_os(FORCE_CPU_ENV).is_some() {
        return ComputeBackend::Fallback;
    }
    if COMPUTE_NODES.iter().any(|node| Path::new(node).exists()) || has_render_node() {
        ComputeBackend::Accelerated
    } else {
        ComputeBackend::Fallback
    }
}

/// Look for a DRM render node (renderD*)
fn has_render_node() -> bool {
    let Ok(entries) = fs::read_dir("/dev/dri") else {
        return false;
    };
    entries
        .flatten()
        .any(|entry| entry.file_name().to_string_lossy().starts_with("renderD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_cpu_forces_fallback() {
        assert_eq!(ComputeBackend::select(true), ComputeBackend::Fallback);
    }

    #[test]
    fn test_detect_is_stable() {
        assert_eq!(ComputeBackend::detect(), ComputeBackend::detect());
    }
}
