//! Runtime feature dispatch (C10).
//!
//! CPU features are probed once and cached; the chosen kernel backend is
//! a value picked at startup, not re-selected on every call (see the
//! "do not re-select per call" design note this module follows).

use crate::kernels::{ChannelSelect, KernelConfig};
use std::sync::OnceLock;

/// CPU features relevant to kernel dispatch, probed once per process.
#[derive(Debug, Clone, Copy)]
pub struct CpuFeatures {
    pub ssse3_popcnt: bool,
    pub sse41: bool,
}

impl CpuFeatures {
    fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                ssse3_popcnt: is_x86_feature_detected!("ssse3") && is_x86_feature_detected!("popcnt"),
                sse41: is_x86_feature_detected!("sse4.1"),
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self { ssse3_popcnt: false, sse41: false }
        }
    }
}

fn features() -> &'static CpuFeatures {
    static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();
    FEATURES.get_or_init(CpuFeatures::detect)
}

/// The kernel implementation chosen for a given `(channels, pad, width,
/// peak)` configuration. Only the hottest combination gets a SIMD
/// variant; everything else runs the portable kernel even when SIMD
/// features are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelBackend {
    Portable,
    SimdBothNoPad16NoPeak,
}

/// Chooses the backend for `cfg` once, using the cached feature probe.
/// Called at pipeline startup; the result is stored by the caller and
/// reused for the lifetime of the capture or extract run.
pub fn select_kernel(cfg: KernelConfig) -> KernelBackend {
    let hot_combo = cfg.channels == ChannelSelect::Both && !cfg.pad && !cfg.peak;

    #[cfg(target_arch = "x86_64")]
    if hot_combo && features().ssse3_popcnt {
        return KernelBackend::SimdBothNoPad16NoPeak;
    }

    let _ = hot_combo;
    KernelBackend::Portable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_hot_combo_always_portable() {
        let cfg = KernelConfig { channels: ChannelSelect::A, pad: false, peak: false };
        assert_eq!(select_kernel(cfg), KernelBackend::Portable);

        let cfg = KernelConfig { channels: ChannelSelect::Both, pad: true, peak: false };
        assert_eq!(select_kernel(cfg), KernelBackend::Portable);
    }

    #[test]
    fn feature_probe_is_cached() {
        let a = features() as *const CpuFeatures;
        let b = features() as *const CpuFeatures;
        assert_eq!(a, b);
    }
}
