//! Prime-hour bands
//!
//! Revenue favours evening peaks, engagement spreads across the day and
//! retention sits mid-morning and early evening. Weekends shift later and the
//! day's strategy adds or narrows bands.

use chrono::Weekday;

use crate::allocation::DailyStrategy;
use crate::models::Category;

const fn hm(hour: u32, minute: u32) -> u32 {
    hour * 60 + minute
}

/// Half-open clock interval in minutes after midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: u32,
    pub end: u32,
}

impl Band {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, minute: u32) -> bool {
        (self.start..self.end).contains(&minute)
    }

    /// Distance from `minute` to the band, zero inside it
    pub fn distance(&self, minute: u32) -> u32 {
        if minute < self.start {
            self.start - minute
        } else if minute >= self.end {
            minute + 1 - self.end
        } else {
            0
        }
    }

    /// Point of the band closest to `minute`
    pub fn nearest_point(&self, minute: u32) -> u32 {
        minute.clamp(self.start, self.end.saturating_sub(1))
    }
}

/// Prime bands per category for one day
#[derive(Debug, Clone, PartialEq)]
pub struct PrimeBands {
    pub revenue: Vec<Band>,
    pub engagement: Vec<Band>,
    pub retention: Vec<Band>,
}

impl PrimeBands {
    pub fn for_day(weekday: Weekday, strategy: DailyStrategy) -> Self {
        let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);

        let mut revenue = match weekday {
            Weekday::Fri | Weekday::Sat => vec![Band::new(hm(13, 0), hm(15, 0)), Band::new(hm(20, 0), hm(23, 30))],
            Weekday::Sun => vec![Band::new(hm(11, 0), hm(13, 0)), Band::new(hm(18, 30), hm(22, 0))],
            _ => vec![Band::new(hm(12, 0), hm(13, 30)), Band::new(hm(19, 0), hm(22, 30))],
        };
        let mut engagement = if weekend {
            vec![
                Band::new(hm(10, 0), hm(12, 0)),
                Band::new(hm(14, 0), hm(17, 0)),
                Band::new(hm(21, 0), hm(23, 30)),
            ]
        } else {
            vec![
                Band::new(hm(8, 0), hm(10, 30)),
                Band::new(hm(12, 30), hm(14, 30)),
                Band::new(hm(16, 30), hm(19, 0)),
                Band::new(hm(21, 0), hm(23, 0)),
            ]
        };
        let mut retention = vec![Band::new(hm(10, 0), hm(12, 0)), Band::new(hm(17, 0), hm(19, 0))];

        match strategy {
            DailyStrategy::RevenueFront => revenue.insert(0, Band::new(hm(9, 0), hm(11, 0))),
            DailyStrategy::EveningRevenue => revenue = vec![Band::new(hm(18, 0), hm(23, 0))],
            DailyStrategy::EngagementHeavy => engagement.push(Band::new(hm(19, 0), hm(21, 0))),
            DailyStrategy::RetentionFirst => retention.insert(0, Band::new(hm(7, 30), hm(9, 30))),
            DailyStrategy::Balanced => {}
        }

        Self {
            revenue,
            engagement,
            retention,
        }
    }

    pub fn for_category(&self, category: Category) -> &[Band] {
        match category {
            Category::Revenue => &self.revenue,
            Category::Engagement => &self.engagement,
            Category::Retention => &self.retention,
        }
    }

    /// Closest in-band minute for the category
    pub fn nearest_point(&self, category: Category, minute: u32) -> Option<u32> {
        self.for_category(category)
            .iter()
            .min_by_key(|b| b.distance(minute))
            .map(|b| b.nearest_point(minute))
    }

    /// Whether `minute` lies within `slack` minutes of a band of the category
    pub fn near(&self, category: Category, minute: u32, slack: u32) -> bool {
        self.for_category(category).iter().any(|b| b.distance(minute) <= slack)
    }
}
