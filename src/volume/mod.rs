//! Volume resolution
//!
//! Fuses the trailing trend windows into per-day send targets, fused
//! saturation/opportunity signals and a confidence score. Missing trend data
//! degrades to tier-baseline counts at a fixed low confidence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::VolumeSettings;
use crate::error::{Error, Result};
use crate::models::{Creator, PerformanceTrends, TrendDirection};

/// Daily send count baseline per tier (index = tier - 1)
pub const TIER_BASELINE: [u32; 5] = [7, 8, 10, 11, 12];

/// Day-of-week volume multipliers, Monday first
pub const DAY_MULTIPLIERS: [f64; 7] = [0.90, 0.95, 1.00, 1.00, 1.10, 1.15, 1.05];

/// Neutral signal value used when trends are missing
const NEUTRAL_SIGNAL: f64 = 50.0;

/// Output of a stage together with the warnings it raised
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Resolved<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Per-run volume targets and fused signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub week_start: NaiveDate,
    /// Target send count per day, Monday first
    pub daily_targets: [u32; 7],
    pub fused_saturation: f64,
    pub fused_opportunity: f64,
    pub fused_purchase_rate: f64,
    pub confidence_score: f64,
    pub day_multipliers: [f64; 7],
    pub direction: TrendDirection,
    /// True when tier baselines were used for lack of trend data
    pub degraded: bool,
}

impl VolumeConfig {
    pub fn weekly_total(&self) -> u32 {
        self.daily_targets.iter().sum()
    }
}

/// Window weight by trailing length
fn window_weight(window_days: u32) -> f64 {
    match window_days {
        0..=7 => 0.5,
        8..=14 => 0.3,
        _ => 0.2,
    }
}

fn recency_factor(days_since_latest: u32) -> f64 {
    match days_since_latest {
        0..=2 => 1.0,
        3..=7 => 0.85,
        8..=14 => 0.70,
        _ => 0.50,
    }
}

/// Resolves weekly volume from tier and trend history
#[derive(Debug, Clone, Default)]
pub struct VolumeResolver {
    settings: VolumeSettings,
}

impl VolumeResolver {
    pub fn new(settings: VolumeSettings) -> Self {
        Self { settings }
    }

    pub fn resolve(
        &self,
        creator: &Creator,
        trends: Option<&PerformanceTrends>,
        week_start: NaiveDate,
    ) -> Result<Resolved<VolumeConfig>> {
        if !(1..=5).contains(&creator.tier) {
            return Err(Error::InvalidTier(creator.tier));
        }
        let baseline = TIER_BASELINE[usize::from(creator.tier - 1)];

        let populated = trends.filter(|t| t.has_samples());
        let Some(trends) = populated else {
            warn!(creator = %creator.id, "Trend data missing, using tier baseline volume");
            let value = VolumeConfig {
                week_start,
                daily_targets: self.targets(baseline, 1.0),
                fused_saturation: NEUTRAL_SIGNAL,
                fused_opportunity: NEUTRAL_SIGNAL,
                fused_purchase_rate: self.settings.default_purchase_rate,
                confidence_score: self.settings.degraded_confidence,
                day_multipliers: DAY_MULTIPLIERS,
                direction: TrendDirection::Stable,
                degraded: true,
            };
            return Ok(Resolved {
                value,
                warnings: vec![format!(
                    "DEGRADED: no trend data; tier {} baseline volume used with confidence {:.1}",
                    creator.tier, self.settings.degraded_confidence
                )],
            });
        };

        let windows: Vec<_> = trends.windows.iter().filter(|w| w.sample_size > 0).collect();
        let total_weight: f64 = windows.iter().map(|w| window_weight(w.window_days)).sum();
        let fuse = |f: fn(&crate::models::TrendWindow) -> f64| -> f64 {
            windows
                .iter()
                .map(|w| f(w) * window_weight(w.window_days))
                .sum::<f64>()
                / total_weight
        };

        let saturation = fuse(|w| w.saturation).clamp(0.0, 100.0);
        let opportunity = fuse(|w| w.opportunity).clamp(0.0, 100.0);
        let purchase_rate = fuse(|w| w.purchase_rate).clamp(0.0, 1.0);

        let total_samples: u32 = windows.iter().map(|w| w.sample_size).sum();
        let freshest = windows.iter().map(|w| w.days_since_latest).min().unwrap_or(u32::MAX);
        let sample_factor =
            (f64::from(total_samples) / f64::from(self.settings.full_sample_size.max(1))).min(1.0);
        let confidence = (sample_factor * recency_factor(freshest) * creator.confidence_baseline)
            .clamp(0.0, 1.0);

        let raw_multiplier = (1.0 + (opportunity - saturation) / 200.0).clamp(0.8, 1.2);
        let multiplier = 1.0 + (raw_multiplier - 1.0) * confidence;

        debug!(
            creator = %creator.id,
            saturation,
            opportunity,
            confidence,
            multiplier,
            "Fused trend windows"
        );

        let value = VolumeConfig {
            week_start,
            daily_targets: self.targets(baseline, multiplier),
            fused_saturation: saturation,
            fused_opportunity: opportunity,
            fused_purchase_rate: purchase_rate,
            confidence_score: confidence,
            day_multipliers: DAY_MULTIPLIERS,
            direction: trends.direction(),
            degraded: false,
        };
        info!(
            creator = %creator.id,
            weekly_total = value.weekly_total(),
            confidence = value.confidence_score,
            "Resolved weekly volume"
        );
        Ok(Resolved::clean(value))
    }

    fn targets(&self, baseline: u32, multiplier: f64) -> [u32; 7] {
        let mut targets = [0; 7];
        for (target, dow) in targets.iter_mut().zip(DAY_MULTIPLIERS) {
            let raw = (f64::from(baseline) * multiplier * dow).round() as u32;
            *target = raw.clamp(self.settings.min_daily, self.settings.max_daily);
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageType, TrendWindow};

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn window(days: u32, sat: f64, opp: f64, samples: u32, age: u32) -> TrendWindow {
        TrendWindow {
            window_days: days,
            saturation: sat,
            opportunity: opp,
            purchase_rate: 0.06,
            direction: TrendDirection::Stable,
            sample_size: samples,
            days_since_latest: age,
        }
    }

    #[test]
    fn test_missing_trends_degrade() {
        let creator = Creator::new("c1", 3, PageType::Paid);
        let resolved = VolumeResolver::default().resolve(&creator, None, week()).unwrap();
        assert!(resolved.value.degraded);
        assert_eq!(resolved.value.confidence_score, 0.3);
        assert_eq!(resolved.value.fused_saturation, 50.0);
        assert_eq!(resolved.value.daily_targets, [9, 10, 10, 10, 11, 12, 11]);
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].starts_with("DEGRADED"));
    }

    #[test]
    fn test_empty_windows_degrade() {
        let creator = Creator::new("c1", 1, PageType::Free);
        let trends = PerformanceTrends {
            windows: vec![window(7, 10.0, 90.0, 0, 1)],
        };
        let resolved = VolumeResolver::default().resolve(&creator, Some(&trends), week()).unwrap();
        assert!(resolved.value.degraded);
    }

    #[test]
    fn test_invalid_tier_blocks() {
        let creator = Creator::new("c1", 0, PageType::Free);
        let err = VolumeResolver::default().resolve(&creator, None, week()).unwrap_err();
        assert!(matches!(err, Error::InvalidTier(0)));
    }

    #[test]
    fn test_fusion_weights_short_windows() {
        let creator = Creator::new("c1", 3, PageType::Paid);
        let trends = PerformanceTrends {
            windows: vec![window(7, 80.0, 20.0, 40, 1), window(30, 20.0, 80.0, 40, 1)],
        };
        let v = VolumeResolver::default()
            .resolve(&creator, Some(&trends), week())
            .unwrap()
            .value;
        // 7d weight 0.5, 30d weight 0.2
        let expected = (80.0 * 0.5 + 20.0 * 0.2) / 0.7;
        assert!((v.fused_saturation - expected).abs() < 1e-9);
        assert!((v.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_from_sample_and_recency() {
        let creator = Creator::new("c1", 2, PageType::Free);
        let trends = PerformanceTrends {
            windows: vec![window(7, 50.0, 50.0, 30, 5)],
        };
        let v = VolumeResolver::default()
            .resolve(&creator, Some(&trends), week())
            .unwrap()
            .value;
        assert!((v.confidence_score - 0.5 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_high_opportunity_raises_volume() {
        let creator = Creator::new("c1", 5, PageType::Free);
        let hot = PerformanceTrends {
            windows: vec![window(7, 10.0, 90.0, 100, 0)],
        };
        let cold = PerformanceTrends {
            windows: vec![window(7, 90.0, 10.0, 100, 0)],
        };
        let resolver = VolumeResolver::default();
        let up = resolver.resolve(&creator, Some(&hot), week()).unwrap().value;
        let down = resolver.resolve(&creator, Some(&cold), week()).unwrap().value;
        assert!(up.weekly_total() > down.weekly_total());
        assert!(up.daily_targets.iter().all(|t| (5..=15).contains(t)));
    }
}
