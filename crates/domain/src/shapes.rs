//! Load shapes: functions of elapsed time producing target concurrency.
//!
//! Every shape is clamped to at least 1 so a run always makes progress.

use serde::{Deserialize, Serialize};

/// A load shape maps `(t, duration, peak)` to a target concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadShape {
    /// Always `peak`.
    #[default]
    Constant,
    /// Linear rise from 0 to `peak` over the run.
    LinearRamp,
    /// Exponential rise, normalised so t = duration hits `peak`.
    Exponential,
    /// Five equal steps from `peak/5` to `peak`.
    Step,
    /// 10% baseline with full `peak` during the central 20% of the run.
    Spike,
    /// Four cycles, each a linear rise from 0 to `peak`.
    Sawtooth,
}

impl LoadShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::LinearRamp => "linear-ramp",
            Self::Exponential => "exponential",
            Self::Step => "step",
            Self::Spike => "spike",
            Self::Sawtooth => "sawtooth",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "constant" => Some(Self::Constant),
            "linear-ramp" => Some(Self::LinearRamp),
            "exponential" => Some(Self::Exponential),
            "step" => Some(Self::Step),
            "spike" => Some(Self::Spike),
            "sawtooth" => Some(Self::Sawtooth),
            _ => None,
        }
    }

    /// All shapes, for the `shapes` listing.
    pub fn all() -> [Self; 6] {
        [
            Self::Constant,
            Self::LinearRamp,
            Self::Exponential,
            Self::Step,
            Self::Spike,
            Self::Sawtooth,
        ]
    }

    /// One-line description for the `shapes` listing.
    pub fn description(self) -> &'static str {
        match self {
            Self::Constant => "hold peak concurrency for the whole run",
            Self::LinearRamp => "ramp linearly from 0 to peak",
            Self::Exponential => "ramp exponentially, reaching peak at the end",
            Self::Step => "five equal steps from peak/5 to peak",
            Self::Spike => "10% baseline with a full-peak spike in the middle",
            Self::Sawtooth => "four linear 0-to-peak cycles",
        }
    }

    /// Target concurrency at elapsed time `t` seconds.
    ///
    /// Always at least 1, never above `peak`.
    pub fn target(self, t: f64, duration: f64, peak: u32) -> u32 {
        let peak_f = peak as f64;
        if duration <= 0.0 {
            return peak.max(1);
        }
        let frac = (t / duration).clamp(0.0, 1.0);
        let raw = match self {
            Self::Constant => peak_f,
            Self::LinearRamp => (frac * peak_f).ceil(),
            Self::Exponential => {
                let num = (3.0 * frac).exp() - 1.0;
                let den = 3.0f64.exp() - 1.0;
                (num / den * peak_f).ceil()
            }
            Self::Step => {
                let step = ((frac * 5.0).floor() as u32).min(4) + 1;
                (peak_f * step as f64 / 5.0).ceil()
            }
            Self::Spike => {
                if (0.4..0.6).contains(&frac) {
                    peak_f
                } else {
                    (peak_f * 0.1).ceil()
                }
            }
            Self::Sawtooth => {
                let cycle = duration / 4.0;
                let pos = (t % cycle) / cycle;
                (pos * peak_f).ceil()
            }
        };
        (raw as u32).clamp(1, peak.max(1))
    }
}

impl std::fmt::Display for LoadShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_is_peak() {
        for t in [0.0, 5.0, 29.9] {
            assert_eq!(LoadShape::Constant.target(t, 30.0, 8), 8);
        }
    }

    #[test]
    fn linear_ramp_hits_peak_at_end() {
        assert_eq!(LoadShape::LinearRamp.target(30.0, 30.0, 10), 10);
        assert_eq!(LoadShape::LinearRamp.target(15.0, 30.0, 10), 5);
    }

    #[test]
    fn exponential_is_monotonic() {
        let mut last = 0;
        for i in 0..=30 {
            let c = LoadShape::Exponential.target(i as f64, 30.0, 50);
            assert!(c >= last, "exponential dipped at t={i}");
            last = c;
        }
        assert_eq!(last, 50);
    }

    #[test]
    fn step_has_five_levels() {
        let targets: Vec<u32> = (0..50)
            .map(|i| LoadShape::Step.target(i as f64, 50.0, 25))
            .collect();
        let mut levels: Vec<u32> = targets.clone();
        levels.dedup();
        assert_eq!(levels, vec![5, 10, 15, 20, 25]);
    }

    #[test]
    fn spike_peaks_in_the_middle() {
        assert_eq!(LoadShape::Spike.target(1.0, 100.0, 40), 4);
        assert_eq!(LoadShape::Spike.target(50.0, 100.0, 40), 40);
        assert_eq!(LoadShape::Spike.target(95.0, 100.0, 40), 4);
    }

    #[test]
    fn sawtooth_resets_each_quarter() {
        let near_cycle_end = LoadShape::Sawtooth.target(24.9, 100.0, 20);
        let cycle_start = LoadShape::Sawtooth.target(25.1, 100.0, 20);
        assert!(near_cycle_end > cycle_start);
    }

    #[test]
    fn every_shape_clamps_to_at_least_one() {
        for shape in LoadShape::all() {
            for peak in [1u32, 3, 10, 100] {
                for i in 0..=20 {
                    let t = i as f64 * 0.05 * 60.0;
                    let c = shape.target(t, 60.0, peak);
                    assert!(c >= 1, "{shape} returned 0 at t={t} peak={peak}");
                    assert!(c <= peak, "{shape} exceeded peak at t={t} peak={peak}");
                }
            }
        }
    }

    #[test]
    fn parse_roundtrip() {
        for shape in LoadShape::all() {
            assert_eq!(LoadShape::parse(shape.as_str()), Some(shape));
        }
        assert_eq!(LoadShape::parse("bogus"), None);
    }

    #[test]
    fn zero_duration_returns_peak() {
        assert_eq!(LoadShape::LinearRamp.target(0.0, 0.0, 7), 7);
    }
}
