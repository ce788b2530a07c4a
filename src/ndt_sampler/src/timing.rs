//! Phase timing for the sampling pipeline.
//!
//! Timings are collected when the `profiling` feature is enabled. Without the
//! feature, [`PhaseTimer`] compiles to a no-op and every phase reports zero.

use serde::{Deserialize, Serialize};
#[cfg(feature = "profiling")]
use std::time::Instant;

/// Timing breakdown of the most recent downsample and prune calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerTiming {
    /// Bounding box and voxel size selection
    pub sizing_ms: f64,
    /// Folding points into voxel distributions
    pub accumulate_ms: f64,
    /// Adjacent-pair KL divergences
    pub divergence_ms: f64,
    /// Tombstoning distributions
    pub prune_ms: f64,
    /// Emitting the output cloud
    pub reconstruct_ms: f64,
}

impl SamplerTiming {
    pub fn total_ms(&self) -> f64 {
        self.sizing_ms
            + self.accumulate_ms
            + self.divergence_ms
            + self.prune_ms
            + self.reconstruct_ms
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Stopwatch for one pipeline phase.
///
/// Under the `profiling` feature it measures wall-clock time and logs the
/// phase at debug level. Otherwise it records zero.
#[cfg(feature = "profiling")]
pub struct PhaseTimer {
    phase: &'static str,
    start: Instant,
}

#[cfg(feature = "profiling")]
impl PhaseTimer {
    #[inline]
    pub fn start(phase: &'static str) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }

    /// Write the elapsed milliseconds into `slot`.
    #[inline]
    pub fn stop(self, slot: &mut f64) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(phase = self.phase, elapsed_ms, "Phase finished");
        *slot = elapsed_ms;
    }
}

#[cfg(not(feature = "profiling"))]
pub struct PhaseTimer;

#[cfg(not(feature = "profiling"))]
impl PhaseTimer {
    #[inline(always)]
    pub fn start(_phase: &'static str) -> Self {
        Self
    }

    #[inline(always)]
    pub fn stop(self, slot: &mut f64) {
        *slot = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_and_json() {
        let timing = SamplerTiming {
            sizing_ms: 1.0,
            accumulate_ms: 2.0,
            divergence_ms: 3.0,
            prune_ms: 0.5,
            reconstruct_ms: 0.25,
        };
        assert_eq!(timing.total_ms(), 6.75);

        let json = timing.to_json().unwrap();
        let parsed: SamplerTiming = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, timing);
        assert!(json.contains("\"divergence_ms\":3.0"));
    }

    #[test]
    fn test_phase_timer_fills_slot() {
        let mut timing = SamplerTiming {
            prune_ms: -1.0,
            ..Default::default()
        };
        PhaseTimer::start("prune").stop(&mut timing.prune_ms);

        #[cfg(feature = "profiling")]
        assert!(timing.prune_ms >= 0.0);

        #[cfg(not(feature = "profiling"))]
        assert_eq!(timing.prune_ms, 0.0);
    }
}
