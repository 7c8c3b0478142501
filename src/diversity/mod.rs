//! Diversity scoring and repair
//!
//! Scores a [`WeeklyAllocation`] on four weighted components and repairs it
//! with a deterministic greedy pass before timing runs.
//!
//! | Component        | Weight | Full marks when                              |
//! |------------------|--------|----------------------------------------------|
//! | Unique types     | 30     | 12 or more distinct send types               |
//! | Concentration    | 25     | no type above 15% of the week                |
//! | Category balance | 25     | revenue/engagement/retention unique floors   |
//! | Daily variety    | 20     | every day has 3 or more distinct types       |

pub mod repair;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::allocation::WeeklyAllocation;
use crate::catalog::SendTypeCatalog;
use crate::config::DiversitySettings;
use crate::error::{Issue, Severity};
use crate::models::{Category, PageType};

pub use repair::break_runs;

/// Upper bound on greedy repair steps
const MAX_REPAIR_STEPS: usize = 256;

// ============================================================================
// Metrics
// ============================================================================

/// Raw diversity measurements of a weekly allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityMetrics {
    pub total: usize,
    pub unique_types: usize,
    /// Share of the week taken by the most frequent type
    pub max_concentration: f64,
    pub most_common: Option<String>,
    pub revenue_types: usize,
    pub engagement_types: usize,
    pub retention_types: usize,
    /// Days meeting the daily distinct-type floor
    pub varied_days: usize,
    /// Days failing the daily distinct-type floor, with their distinct count
    pub flat_days: Vec<(Weekday, usize)>,
}

impl DiversityMetrics {
    pub fn compute(week: &WeeklyAllocation, settings: &DiversitySettings) -> Self {
        let counts = week.weekly_counts();
        let total = week.total();

        let (most_common, max_count) = counts
            .iter()
            .fold((None, 0), |(best, max), (key, &n)| {
                if n > max {
                    (Some(key.clone()), n)
                } else {
                    (best, max)
                }
            });

        let unique_in = |category: Category| {
            let mut keys: Vec<&str> = week
                .days
                .iter()
                .flat_map(|d| &d.slots)
                .filter(|s| s.category == category)
                .map(|s| s.send_type.as_str())
                .collect();
            keys.sort_unstable();
            keys.dedup();
            keys.len()
        };

        let mut flat_days = Vec::new();
        for day in &week.days {
            let distinct = day.distinct_types();
            if distinct < settings.min_daily_types {
                flat_days.push((day.weekday, distinct));
            }
        }

        Self {
            total,
            unique_types: counts.len(),
            max_concentration: if total == 0 {
                0.0
            } else {
                f64::from(max_count) / total as f64
            },
            most_common,
            revenue_types: unique_in(Category::Revenue),
            engagement_types: unique_in(Category::Engagement),
            retention_types: unique_in(Category::Retention),
            varied_days: week.days.len() - flat_days.len(),
            flat_days,
        }
    }

    /// Category unique-type floors as (category, actual, required); retention only on paid pages
    pub fn category_floors(&self, page_type: PageType, settings: &DiversitySettings) -> Vec<(Category, usize, usize)> {
        let mut floors = vec![
            (Category::Revenue, self.revenue_types, settings.min_revenue_types),
            (Category::Engagement, self.engagement_types, settings.min_engagement_types),
        ];
        if page_type == PageType::Paid {
            floors.push((Category::Retention, self.retention_types, settings.min_retention_types));
        }
        floors
    }

    /// Unique-type floor or concentration ceiling broken
    pub fn hard_failure(&self, settings: &DiversitySettings) -> bool {
        self.unique_types < settings.min_unique_types || self.max_concentration > settings.concentration_ceiling
    }
}

// ============================================================================
// Score
// ============================================================================

/// Points earned per component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub unique_types: f64,
    pub concentration: f64,
    pub category_balance: f64,
    pub daily_variety: f64,
}

impl ScoreComponents {
    pub fn total(&self) -> f64 {
        self.unique_types + self.concentration + self.category_balance + self.daily_variety
    }
}

/// Outcome class of a diversity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversityStatus {
    Clean,
    /// Proceeds with a remediation note
    Remediate,
    /// Stops the run
    Blocked,
}

impl fmt::Display for DiversityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Remediate => write!(f, "remediate"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Result of [`DiversityEnforcer::enforce`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityReport {
    pub score: f64,
    pub components: ScoreComponents,
    pub status: DiversityStatus,
    pub metrics: DiversityMetrics,
    /// Residual violations after repair
    pub violations: Vec<Issue>,
    pub transfers: usize,
    pub replacements: usize,
    pub runs_broken: usize,
    pub warnings: Vec<String>,
}

impl DiversityReport {
    pub fn is_blocked(&self) -> bool {
        self.status == DiversityStatus::Blocked
    }
}

// ============================================================================
// Enforcer
// ============================================================================

/// Scores and repairs weekly allocations
pub struct DiversityEnforcer<'a> {
    catalog: &'a SendTypeCatalog,
    settings: DiversitySettings,
}

impl<'a> DiversityEnforcer<'a> {
    pub fn new(catalog: &'a SendTypeCatalog, settings: DiversitySettings) -> Self {
        Self { catalog, settings }
    }

    pub fn settings(&self) -> &DiversitySettings {
        &self.settings
    }

    /// Composite score with its components
    pub fn score(&self, week: &WeeklyAllocation) -> (f64, ScoreComponents) {
        let s = &self.settings;
        let m = DiversityMetrics::compute(week, s);

        let unique_types = 30.0 * (m.unique_types as f64 / s.target_unique_types.max(1) as f64).min(1.0);

        let concentration = if m.max_concentration <= s.concentration_target {
            25.0
        } else if m.max_concentration <= s.concentration_ceiling {
            let span = (s.concentration_ceiling - s.concentration_target).max(f64::EPSILON);
            25.0 - 15.0 * (m.max_concentration - s.concentration_target) / span
        } else {
            0.0
        };

        let floors = m.category_floors(week.page_type, s);
        let met = floors.iter().filter(|(_, actual, required)| actual >= required).count();
        let category_balance = 25.0 * met as f64 / floors.len().max(1) as f64;

        let daily_variety = 20.0 * m.varied_days as f64 / week.days.len().max(1) as f64;

        let components = ScoreComponents {
            unique_types,
            concentration,
            category_balance,
            daily_variety,
        };
        (components.total(), components)
    }

    pub fn status_for(&self, score: f64, hard_failure: bool) -> DiversityStatus {
        if hard_failure || score < self.settings.block_below {
            DiversityStatus::Blocked
        } else if score < self.settings.clean_at {
            DiversityStatus::Remediate
        } else {
            DiversityStatus::Clean
        }
    }

    /// Repair the allocation and report the resulting score
    pub fn enforce(&self, mut week: WeeklyAllocation) -> (WeeklyAllocation, DiversityReport) {
        let (before, _) = self.score(&week);
        let mut transfers = 0;
        let mut replacements = 0;

        for _ in 0..MAX_REPAIR_STEPS {
            let metrics = DiversityMetrics::compute(&week, &self.settings);
            let targets = repair::transfer_targets(&metrics, week.page_type, &self.settings);
            if targets
                .into_iter()
                .any(|target| repair::transfer_once(&mut week, self.catalog, target))
            {
                transfers += 1;
                continue;
            }
            if !metrics.flat_days.is_empty()
                && repair::diversify_flat_day(&mut week, self.catalog, &metrics.flat_days)
            {
                replacements += 1;
                continue;
            }
            break;
        }

        let mut runs_broken = 0;
        for day in &mut week.days {
            runs_broken += break_runs(day, self.catalog, self.settings.max_consecutive_same);
        }

        let (score, components) = self.score(&week);
        let metrics = DiversityMetrics::compute(&week, &self.settings);
        let status = self.status_for(score, metrics.hard_failure(&self.settings));
        let (violations, warnings) = self.residuals(&week, &metrics, score, status);

        debug!(before, after = score, transfers, replacements, runs_broken, "Diversity repair finished");
        match status {
            DiversityStatus::Blocked => warn!(score, unique = metrics.unique_types, "Diversity blocks the schedule"),
            _ => info!(score, status = %status, unique = metrics.unique_types, "Diversity enforced"),
        }

        let report = DiversityReport {
            score,
            components,
            status,
            metrics,
            violations,
            transfers,
            replacements,
            runs_broken,
            warnings,
        };
        (week, report)
    }

    fn residuals(
        &self,
        week: &WeeklyAllocation,
        m: &DiversityMetrics,
        score: f64,
        status: DiversityStatus,
    ) -> (Vec<Issue>, Vec<String>) {
        let s = &self.settings;
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        if m.unique_types < s.min_unique_types {
            issues.push(Issue::new(
                Severity::Structural,
                "unique_types",
                format!("{} unique send types, at least {} required", m.unique_types, s.min_unique_types),
            ));
        }
        let most_common = m.most_common.as_deref().unwrap_or("-");
        if m.max_concentration > s.concentration_ceiling {
            issues.push(Issue::new(
                Severity::Structural,
                "concentration",
                format!(
                    "{most_common} is {:.1}% of the week, ceiling {:.0}%",
                    m.max_concentration * 100.0,
                    s.concentration_ceiling * 100.0
                ),
            ));
        } else if m.max_concentration > s.concentration_target {
            warnings.push(format!(
                "ADVISORY: {most_common} is {:.1}% of the week, above the {:.0}% target",
                m.max_concentration * 100.0,
                s.concentration_target * 100.0
            ));
        }
        for (category, actual, required) in m.category_floors(week.page_type, s) {
            if actual < required {
                issues.push(Issue::new(
                    Severity::Advisory,
                    "category_balance",
                    format!("{actual} unique {category} types, {required} required"),
                ));
            }
        }
        for &(day, distinct) in &m.flat_days {
            issues.push(
                Issue::new(
                    Severity::Advisory,
                    "daily_variety",
                    format!("{distinct} distinct types, {} required", s.min_daily_types),
                )
                .on_day(day),
            );
        }
        for day in &week.days {
            if let Some((key, len)) = repair::longest_run(day).filter(|(_, len)| *len > s.max_consecutive_same) {
                issues.push(
                    Issue::new(
                        Severity::Advisory,
                        "consecutive_same_type",
                        format!("{len} consecutive {key} sends could not be separated"),
                    )
                    .on_day(day.weekday),
                );
            }
        }

        match status {
            DiversityStatus::Remediate => warnings.push(format!(
                "ADVISORY: diversity score {score:.1} below {:.0}; remediation recommended",
                s.clean_at
            )),
            DiversityStatus::Blocked if score < s.block_below => issues.push(Issue::new(
                Severity::Structural,
                "diversity_score",
                format!("diversity score {score:.1} below {:.0}", s.block_below),
            )),
            _ => {}
        }
        (issues, warnings)
    }
}
