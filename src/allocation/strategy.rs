//! Daily strategy rotation
//!
//! Each day of the week runs one strategy from a closed set. Assignment
//! follows an explicit weekday table rotated by a seeded offset, so the same
//! creator and week always produce the same rotation while different weeks
//! vary.

use chrono::{NaiveDate, Weekday};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::AllocationError;
use crate::models::{Category, PageType};

/// Strategy governing a day's category mix and send ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyStrategy {
    /// Revenue sends lead the day
    RevenueFront,
    /// Engagement-weighted mix, engagement leads
    EngagementHeavy,
    /// Round-robin across categories
    Balanced,
    /// Revenue concentrated in the evening
    EveningRevenue,
    /// Retention sends lead the day (paid pages)
    RetentionFirst,
}

/// Base weekday table, Monday first
pub const WEEKDAY_TABLE: [DailyStrategy; 7] = [
    DailyStrategy::Balanced,
    DailyStrategy::EngagementHeavy,
    DailyStrategy::RevenueFront,
    DailyStrategy::Balanced,
    DailyStrategy::EveningRevenue,
    DailyStrategy::RevenueFront,
    DailyStrategy::RetentionFirst,
];

/// Minimum number of distinct strategies per week
pub const MIN_DISTINCT_STRATEGIES: usize = 3;

impl DailyStrategy {
    pub fn all() -> [Self; 5] {
        [
            Self::RevenueFront,
            Self::EngagementHeavy,
            Self::Balanced,
            Self::EveningRevenue,
            Self::RetentionFirst,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::RevenueFront => "revenue_front",
            Self::EngagementHeavy => "engagement_heavy",
            Self::Balanced => "balanced",
            Self::EveningRevenue => "evening_revenue",
            Self::RetentionFirst => "retention_first",
        }
    }

    /// Share of the day's sends for revenue and retention; engagement takes the rest
    pub fn category_weights(&self) -> (f64, f64) {
        match self {
            Self::RevenueFront => (0.55, 0.15),
            Self::EngagementHeavy => (0.40, 0.15),
            Self::Balanced => (0.45, 0.20),
            Self::EveningRevenue => (0.50, 0.15),
            Self::RetentionFirst => (0.40, 0.25),
        }
    }

    /// Split a day's target into (revenue, engagement, retention) counts
    pub fn split(&self, target: u32) -> (u32, u32, u32) {
        let (rev_w, ret_w) = self.category_weights();
        let revenue = (f64::from(target) * rev_w).ceil() as u32;
        let retention = ((f64::from(target) * ret_w).floor() as u32).min(target - revenue.min(target));
        let engagement = target.saturating_sub(revenue + retention);
        (revenue.min(target), engagement, retention)
    }

    /// Category sequence for a day, before send types are chosen
    pub fn category_order(&self, revenue: u32, engagement: u32, retention: u32) -> Vec<Category> {
        use Category::{Engagement, Retention, Revenue};
        let mut order = Vec::with_capacity((revenue + engagement + retention) as usize);
        match self {
            Self::RevenueFront => {
                interleave(&mut order, (Revenue, revenue), (Engagement, engagement));
                order.extend(std::iter::repeat(Retention).take(retention as usize));
            }
            Self::EveningRevenue => {
                let early = engagement / 2;
                interleave(&mut order, (Engagement, early), (Retention, retention));
                interleave(&mut order, (Revenue, revenue), (Engagement, engagement - early));
            }
            Self::EngagementHeavy => {
                interleave(&mut order, (Engagement, engagement), (Revenue, revenue));
                order.extend(std::iter::repeat(Retention).take(retention as usize));
            }
            Self::Balanced => {
                let mut left = [(Revenue, revenue), (Engagement, engagement), (Retention, retention)];
                while left.iter().any(|(_, n)| *n > 0) {
                    for (category, n) in left.iter_mut() {
                        if *n > 0 {
                            order.push(*category);
                            *n -= 1;
                        }
                    }
                }
            }
            Self::RetentionFirst => {
                order.extend(std::iter::repeat(Retention).take(retention as usize));
                interleave(&mut order, (Revenue, revenue), (Engagement, engagement));
            }
        }
        order
    }
}

/// Alternate two categories, leader first, then append the remainder
fn interleave(order: &mut Vec<Category>, lead: (Category, u32), follow: (Category, u32)) {
    let (lead_cat, mut lead_n) = lead;
    let (follow_cat, mut follow_n) = follow;
    while lead_n > 0 || follow_n > 0 {
        if lead_n > 0 {
            order.push(lead_cat);
            lead_n -= 1;
        }
        if follow_n > 0 {
            order.push(follow_cat);
            follow_n -= 1;
        }
    }
}

impl fmt::Display for DailyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Seed combining the creator and the week
pub fn rotation_seed(creator_seed: u64, week_start: NaiveDate) -> u64 {
    use chrono::Datelike;
    creator_seed ^ (week_start.num_days_from_ce() as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Assign one strategy per day, Monday first
pub fn assign_strategies(seed: u64, page_type: PageType) -> Result<[DailyStrategy; 7], AllocationError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let offset: usize = rng.gen_range(0..7);

    let mut week = [DailyStrategy::Balanced; 7];
    for (day, slot) in week.iter_mut().enumerate() {
        let strategy = WEEKDAY_TABLE[(day + offset) % 7];
        *slot = match (strategy, page_type) {
            (DailyStrategy::RetentionFirst, PageType::Free) => DailyStrategy::EngagementHeavy,
            (s, _) => s,
        };
    }

    validate_rotation(&week)?;
    Ok(week)
}

/// Anti-repeat and variety check over a week's rotation
pub fn validate_rotation(week: &[DailyStrategy; 7]) -> Result<(), AllocationError> {
    if let Some(i) = week.windows(2).position(|pair| pair[0] == pair[1]) {
        return Err(AllocationError::StrategyRepeat {
            day: weekday_at(i + 1),
            strategy: week[i],
        });
    }

    let distinct: HashSet<_> = week.iter().collect();
    if distinct.len() < MIN_DISTINCT_STRATEGIES {
        return Err(AllocationError::InsufficientStrategies {
            distinct: distinct.len(),
            required: MIN_DISTINCT_STRATEGIES,
        });
    }
    Ok(())
}

/// Weekday for a Monday-based index
pub fn weekday_at(index: usize) -> Weekday {
    const WEEK: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    WEEK[index % 7]
}
