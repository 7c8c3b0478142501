//! Configuration management for the planner
//!
//! This module handles loading and validating planner thresholds from
//! environment variables and TOML files. Every section has defaults, so a
//! config file only needs to name the values it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub volume: VolumeSettings,
    pub diversity: DiversitySettings,
    pub timing: TimingSettings,
    pub pricing: PricingSettings,
    pub validation: ValidationSettings,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Volume resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSettings {
    /// Lower clamp for a day's target count
    pub min_daily: u32,

    /// Upper clamp for a day's target count
    pub max_daily: u32,

    /// Confidence used when trend data is missing
    pub degraded_confidence: f64,

    /// Sample size at which trend data is fully trusted
    pub full_sample_size: u32,

    /// Purchase rate assumed when trends are missing
    pub default_purchase_rate: f64,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            min_daily: 5,
            max_daily: 15,
            degraded_confidence: 0.3,
            full_sample_size: 60,
            default_purchase_rate: 0.05,
        }
    }
}

/// Diversity thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversitySettings {
    pub min_unique_types: usize,
    pub target_unique_types: usize,
    pub concentration_target: f64,
    pub concentration_ceiling: f64,
    pub min_revenue_types: usize,
    pub min_engagement_types: usize,
    /// Applied on paid pages only
    pub min_retention_types: usize,
    pub min_daily_types: usize,
    pub max_consecutive_same: usize,
    /// Scores below this block the run
    pub block_below: f64,
    /// Scores at or above this proceed without a remediation note
    pub clean_at: f64,
}

impl Default for DiversitySettings {
    fn default() -> Self {
        Self {
            min_unique_types: 10,
            target_unique_types: 12,
            concentration_target: 0.15,
            concentration_ceiling: 0.20,
            min_revenue_types: 4,
            min_engagement_types: 4,
            min_retention_types: 2,
            min_daily_types: 3,
            max_consecutive_same: 2,
            block_below: 60.0,
            clean_at: 70.0,
        }
    }
}

/// Timing assignment settings; clock values are minutes after midnight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub global_gap_minutes: u32,
    pub same_type_gap_minutes: u32,
    pub dead_zone_start_minute: u32,
    pub dead_zone_end_minute: u32,
    /// Latest minute an independent send may be placed at
    pub window_end_minute: u32,
    pub jitter_min: i32,
    pub jitter_max: i32,
    pub rolling_window_minutes: u32,
    pub max_per_rolling_window: usize,
    /// Fixed seed for jitter and anchor spread; derived from creator and week when absent
    pub seed: Option<u64>,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            global_gap_minutes: 45,
            same_type_gap_minutes: 120,
            dead_zone_start_minute: 3 * 60,
            dead_zone_end_minute: 7 * 60,
            window_end_minute: 23 * 60 + 45,
            jitter_min: -7,
            jitter_max: 8,
            rolling_window_minutes: 150,
            max_per_rolling_window: 3,
            seed: None,
        }
    }
}

/// Pricing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    /// Apply weekend premium and Monday discount
    pub day_of_week_pricing: bool,
    /// Below this, prices round to whole dollars
    pub low_price_threshold: f64,
    /// Up to this, prices round to the nearest $5; above it, the nearest $10
    pub mid_price_threshold: f64,
    /// Half-width of the revenue projection band
    pub projection_band: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            day_of_week_pricing: false,
            low_price_threshold: 20.0,
            mid_price_threshold: 50.0,
            projection_band: 0.20,
        }
    }
}

/// Cutoffs for one scorer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScorerCutoffs {
    pub approve_at: f64,
    pub review_at: f64,
    /// Below this the scorer forces rejection
    pub hard_floor: f64,
}

/// Consensus validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub compliance: ScorerCutoffs,
    pub strategic: ScorerCutoffs,
    /// Divergence above which manual reconciliation is mandatory
    pub reconciliation_divergence: f64,
    /// Divergence at or below which the reported score is averaged
    pub averaging_divergence: f64,
    /// Inter-arrival coefficient of variation below which a day looks scripted
    pub regularity_cv_threshold: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            compliance: ScorerCutoffs {
                approve_at: 85.0,
                review_at: 65.0,
                hard_floor: 50.0,
            },
            strategic: ScorerCutoffs {
                approve_at: 80.0,
                review_at: 60.0,
                hard_floor: 45.0,
            },
            reconciliation_divergence: 15.0,
            averaging_divergence: 10.0,
            regularity_cv_threshold: 0.10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl PlannerConfig {
    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay `SENDPLAN_*` environment variables
    pub fn apply_env(&mut self) {
        if let Some(seed) = env_parse::<u64>("SENDPLAN_SEED") {
            self.timing.seed = Some(seed);
        }
        if let Some(gap) = env_parse::<u32>("SENDPLAN_GLOBAL_GAP_MINUTES") {
            self.timing.global_gap_minutes = gap;
        }
        if let Some(enabled) = env_parse::<bool>("SENDPLAN_DAY_OF_WEEK_PRICING") {
            self.pricing.day_of_week_pricing = enabled;
        }
        if let Some(timeout) = env_parse::<u64>("SENDPLAN_LOOKUP_TIMEOUT_MS") {
            self.retry.attempt_timeout_ms = timeout;
        }
        if let Ok(level) = std::env::var("SENDPLAN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SENDPLAN_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.volume.min_daily == 0 || self.volume.min_daily > self.volume.max_daily {
            anyhow::bail!("volume.min_daily must be in 1..=max_daily");
        }

        if !(0.0..=1.0).contains(&self.volume.degraded_confidence) {
            anyhow::bail!("volume.degraded_confidence must be within 0-1");
        }

        let d = &self.diversity;
        if d.concentration_target > d.concentration_ceiling {
            anyhow::bail!("diversity.concentration_target must not exceed concentration_ceiling");
        }
        if d.block_below > d.clean_at {
            anyhow::bail!("diversity.block_below must not exceed clean_at");
        }

        let t = &self.timing;
        if t.global_gap_minutes == 0 {
            anyhow::bail!("timing.global_gap_minutes must be greater than 0");
        }
        if t.jitter_min > t.jitter_max {
            anyhow::bail!("timing.jitter_min must not exceed jitter_max");
        }
        if t.dead_zone_start_minute >= t.dead_zone_end_minute
            || t.dead_zone_end_minute >= t.window_end_minute
            || t.window_end_minute >= 24 * 60
        {
            anyhow::bail!("timing clock values must satisfy dead_zone_start < dead_zone_end < window_end < 24:00");
        }
        if t.max_per_rolling_window == 0 {
            anyhow::bail!("timing.max_per_rolling_window must be greater than 0");
        }

        if self.pricing.low_price_threshold > self.pricing.mid_price_threshold {
            anyhow::bail!("pricing.low_price_threshold must not exceed mid_price_threshold");
        }

        for (name, cutoffs) in [
            ("compliance", self.validation.compliance),
            ("strategic", self.validation.strategic),
        ] {
            if !(cutoffs.hard_floor <= cutoffs.review_at && cutoffs.review_at <= cutoffs.approve_at) {
                anyhow::bail!("validation.{name} cutoffs must satisfy hard_floor <= review_at <= approve_at");
            }
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }

        Ok(())
    }

    /// Get lookup timeout as Duration
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.retry.attempt_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_dead_zone() {
        let mut config = PlannerConfig::default();
        config.timing.dead_zone_end_minute = config.timing.dead_zone_start_minute;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_cutoffs() {
        let mut config = PlannerConfig::default();
        config.validation.strategic.hard_floor = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PlannerConfig = toml::from_str(
            r#"
            [timing]
            seed = 42
            global_gap_minutes = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.seed, Some(42));
        assert_eq!(config.timing.global_gap_minutes, 50);
        assert_eq!(config.timing.same_type_gap_minutes, 120);
        assert_eq!(config.diversity.min_unique_types, 10);
    }

    #[test]
    fn test_lookup_timeout_conversion() {
        let config = PlannerConfig::default();
        assert_eq!(config.lookup_timeout(), Duration::from_millis(config.retry.attempt_timeout_ms));
    }
}
