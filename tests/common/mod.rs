//! Common test utilities

use chrono::{NaiveDate, Timelike};
use sendplan::models::{
    ContentRankings, ContentTier, Creator, PageType, PerformanceTrends, TrendDirection, TrendWindow,
};
use sendplan::pipeline::StaticContext;
use sendplan::WeeklySchedule;

/// Monday of the planned week
pub fn week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn rankings() -> ContentRankings {
    ContentRankings::new([
        ("solo".to_string(), ContentTier::Top),
        ("lingerie".to_string(), ContentTier::Top),
        ("shower".to_string(), ContentTier::Mid),
        ("toys".to_string(), ContentTier::Mid),
        ("cosplay".to_string(), ContentTier::Low),
        ("feet".to_string(), ContentTier::Avoid),
    ])
}

pub fn trends() -> PerformanceTrends {
    let window = |window_days, saturation, opportunity, sample_size, days_since_latest| TrendWindow {
        window_days,
        saturation,
        opportunity,
        purchase_rate: 0.06,
        direction: TrendDirection::Stable,
        sample_size,
        days_since_latest,
    };
    PerformanceTrends {
        windows: vec![
            window(7, 40.0, 65.0, 30, 1),
            window(14, 45.0, 60.0, 45, 1),
            window(30, 50.0, 55.0, 90, 1),
        ],
    }
}

/// Fully populated context for one creator
pub fn context(id: &str, tier: u8, page_type: PageType) -> StaticContext {
    StaticContext::new(Creator::new(id, tier, page_type))
        .with_trends(trends())
        .with_rankings(rankings())
}

/// Times on one date as minutes after midnight, ascending
#[allow(dead_code)]
pub fn day_minutes(schedule: &WeeklySchedule, date: NaiveDate) -> Vec<u32> {
    let mut minutes: Vec<u32> = schedule
        .items
        .iter()
        .filter(|i| i.date == date)
        .filter_map(|i| i.time)
        .map(|t| t.hour() * 60 + t.minute())
        .collect();
    minutes.sort_unstable();
    minutes
}
