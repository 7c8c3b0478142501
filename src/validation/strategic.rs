//! Strategic scorer
//!
//! Earns points out of 100 across four areas:
//!
//! | Area              | Points |
//! |-------------------|--------|
//! | Revenue soundness | 30     |
//! | Authenticity      | 30     |
//! | Coherence         | 20     |
//! | Risk coverage     | 20     |

use chrono::{NaiveTime, Timelike};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{ScheduleSnapshot, Scorer, ScorerReport};
use crate::config::ScorerCutoffs;
use crate::error::{Issue, Severity};
use crate::models::{Category, ContentTier, ScheduleItem};
use crate::timing::PrimeBands;

/// Slack around revenue prime bands, in minutes
const BAND_SLACK: u32 = 90;

/// A clock time repeated on this many days reads as automated
const REPEATED_TIME_DAYS: usize = 3;

fn minute_of(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

pub struct StrategicScorer {
    cutoffs: ScorerCutoffs,
    cv_threshold: f64,
}

impl StrategicScorer {
    pub fn new(cutoffs: ScorerCutoffs, cv_threshold: f64) -> Self {
        Self { cutoffs, cv_threshold }
    }

    fn revenue_soundness(&self, snap: &ScheduleSnapshot, issues: &mut Vec<Issue>) -> f64 {
        let items = &snap.schedule.items;
        if items.is_empty() {
            return 0.0;
        }
        let revenue: Vec<&ScheduleItem> = items.iter().filter(|i| i.category == Category::Revenue).collect();

        let share = revenue.len() as f64 / items.len() as f64;
        let distance = if share < 0.40 {
            0.40 - share
        } else if share > 0.60 {
            share - 0.60
        } else {
            0.0
        };
        if distance > 0.0 {
            issues.push(Issue::new(
                Severity::Advisory,
                "revenue_share",
                format!("revenue is {:.0}% of sends", share * 100.0),
            ));
        }
        let share_points = (10.0 - distance * 100.0).max(0.0);

        let timed: Vec<&&ScheduleItem> = revenue.iter().filter(|i| i.time.is_some()).collect();
        let band_points = if timed.is_empty() {
            0.0
        } else {
            let aligned = timed
                .iter()
                .filter(|item| {
                    let strategy = snap
                        .schedule
                        .day_plan(item.day)
                        .map(|d| d.strategy)
                        .unwrap_or(crate::allocation::DailyStrategy::Balanced);
                    let minute = item.time.map_or(0, minute_of);
                    PrimeBands::for_day(item.day, strategy).near(Category::Revenue, minute, BAND_SLACK)
                })
                .count();
            10.0 * aligned as f64 / timed.len() as f64
        };

        let with_content: Vec<ContentTier> = revenue
            .iter()
            .filter_map(|i| i.content_type.as_deref())
            .map(|c| snap.rankings.tier_of(c).unwrap_or(ContentTier::Mid))
            .collect();
        let content_points = if with_content.is_empty() {
            10.0
        } else {
            let strong = with_content
                .iter()
                .filter(|t| matches!(t, ContentTier::Top | ContentTier::Mid))
                .count();
            10.0 * strong as f64 / with_content.len() as f64
        };

        share_points + band_points + content_points
    }

    fn authenticity(&self, snap: &ScheduleSnapshot, issues: &mut Vec<Issue>) -> f64 {
        let mut evaluated = 0usize;
        let mut robotic = 0usize;
        let mut sequences: HashSet<Vec<&str>> = HashSet::new();
        let mut days_by_time: HashMap<u32, HashSet<chrono::NaiveDate>> = HashMap::new();

        for plan in &snap.schedule.days {
            let day_items: Vec<&ScheduleItem> = snap.schedule.items.iter().filter(|i| i.date == plan.date).collect();
            sequences.insert(day_items.iter().map(|i| i.send_type.as_str()).collect());

            let mut minutes: Vec<u32> = day_items.iter().filter_map(|i| i.time.map(minute_of)).collect();
            minutes.sort_unstable();
            for &m in &minutes {
                days_by_time.entry(m).or_default().insert(plan.date);
            }

            let gaps: Vec<f64> = minutes.windows(2).map(|w| f64::from(w[1] - w[0])).collect();
            if gaps.len() < 2 {
                continue;
            }
            evaluated += 1;
            let mean = gaps.iter().mean();
            let cv = if mean > 0.0 { gaps.iter().population_std_dev() / mean } else { 0.0 };
            if cv < self.cv_threshold {
                robotic += 1;
                issues.push(
                    Issue::new(
                        Severity::Advisory,
                        "robotic_timing",
                        format!("inter-send gaps vary by {:.1}%", cv * 100.0),
                    )
                    .on_day(plan.weekday),
                );
            }
        }

        let regularity = if evaluated == 0 {
            15.0
        } else {
            15.0 * (1.0 - robotic as f64 / evaluated as f64)
        };

        let repeated = days_by_time.values().filter(|d| d.len() >= REPEATED_TIME_DAYS).count();
        if repeated > 0 {
            issues.push(Issue::new(
                Severity::Advisory,
                "repeated_times",
                format!("{repeated} clock times recur on {REPEATED_TIME_DAYS} or more days"),
            ));
        }
        let repetition = (10.0 - 2.0 * repeated as f64).max(0.0);

        let days = snap.schedule.days.len().max(1);
        let variety = 5.0 * sequences.len().min(days) as f64 / days as f64;

        regularity + repetition + variety
    }

    fn coherence(&self, snap: &ScheduleSnapshot, issues: &mut Vec<Issue>) -> f64 {
        let strategies: Vec<&str> = snap.schedule.days.iter().map(|d| d.strategy.id()).collect();
        if strategies.is_empty() {
            return 0.0;
        }
        let distinct = strategies.iter().collect::<HashSet<_>>().len();
        let rotation = 8.0 * (distinct as f64 / 3.0).min(1.0);

        let repeats = strategies.windows(2).filter(|w| w[0] == w[1]).count();
        if repeats > 0 {
            issues.push(Issue::new(
                Severity::Advisory,
                "strategy_rotation",
                format!("{repeats} consecutive days share a strategy"),
            ));
        }
        let alternation = (6.0 - 2.0 * repeats as f64).max(0.0);

        let volumes: Vec<usize> = snap
            .schedule
            .days
            .iter()
            .map(|d| snap.schedule.items.iter().filter(|i| i.date == d.date).count())
            .collect();
        let (lo, hi) = (
            volumes.iter().copied().min().unwrap_or(0),
            volumes.iter().copied().max().unwrap_or(0),
        );
        let smooth = if lo > 0 && hi <= 2 * lo {
            6.0
        } else {
            issues.push(Issue::new(
                Severity::Advisory,
                "volume_swing",
                format!("daily volume ranges from {lo} to {hi}"),
            ));
            0.0
        };

        rotation + alternation + smooth
    }

    fn risk_coverage(&self, snap: &ScheduleSnapshot, issues: &mut Vec<Issue>) -> f64 {
        if snap.flagged_segments.is_empty() {
            return 20.0;
        }
        let present: HashSet<&str> = snap.schedule.items.iter().map(|i| i.send_type.as_str()).collect();
        let mut covered = 0usize;
        for segment in &snap.flagged_segments {
            if segment.addressed_by().iter().any(|t| present.contains(t)) {
                covered += 1;
            } else {
                issues.push(Issue::new(
                    Severity::Advisory,
                    "risk_coverage",
                    format!("no send addresses flagged segment {segment:?}"),
                ));
            }
        }
        20.0 * covered as f64 / snap.flagged_segments.len() as f64
    }
}

impl Scorer for StrategicScorer {
    fn name(&self) -> &'static str {
        "strategic"
    }

    fn evaluate(&self, snapshot: &ScheduleSnapshot) -> ScorerReport {
        let mut issues = Vec::new();
        let mut breakdown = BTreeMap::new();
        breakdown.insert("revenue_soundness".to_string(), self.revenue_soundness(snapshot, &mut issues));
        breakdown.insert("authenticity".to_string(), self.authenticity(snapshot, &mut issues));
        breakdown.insert("coherence".to_string(), self.coherence(snapshot, &mut issues));
        breakdown.insert("risk_coverage".to_string(), self.risk_coverage(snapshot, &mut issues));

        let earned: f64 = breakdown.values().sum();
        let mut report = ScorerReport::from_score(self.name(), earned, &self.cutoffs);
        report.breakdown = breakdown;
        report.issues = issues;
        report
    }
}
