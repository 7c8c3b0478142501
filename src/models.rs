// Core data structures shared by every planning stage

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Creator
// ============================================================================

/// Page monetization model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    Free,
    Paid,
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

/// Creator profile, immutable for the duration of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    /// Performance tier (1-5)
    pub tier: u8,
    pub page_type: PageType,
    #[serde(default)]
    pub fan_count: u64,
    /// Baseline trust in this creator's trend data (0-1)
    #[serde(default = "default_confidence_baseline")]
    pub confidence_baseline: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_confidence_baseline() -> f64 {
    1.0
}

fn default_timezone() -> String {
    String::from("UTC")
}

impl Creator {
    pub fn new(id: impl Into<String>, tier: u8, page_type: PageType) -> Self {
        Self {
            id: id.into(),
            tier,
            page_type,
            fan_count: 0,
            confidence_baseline: default_confidence_baseline(),
            timezone: default_timezone(),
        }
    }

    /// Stable seed derived from the creator id (FNV-1a)
    pub fn seed(&self) -> u64 {
        self.id.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
    }
}

// ============================================================================
// Categories and content
// ============================================================================

/// Send-type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Revenue,
    Engagement,
    Retention,
}

impl Category {
    pub fn all() -> [Self; 3] {
        [Self::Revenue, Self::Engagement, Self::Retention]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Engagement => "engagement",
            Self::Retention => "retention",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Performance tier of a content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentTier {
    Top,
    Mid,
    Low,
    Avoid,
}

/// Content type rankings supplied by the analytics collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentRankings {
    pub rankings: BTreeMap<String, ContentTier>,
}

impl ContentRankings {
    pub fn new(rankings: impl IntoIterator<Item = (String, ContentTier)>) -> Self {
        Self {
            rankings: rankings.into_iter().collect(),
        }
    }

    pub fn tier_of(&self, content_type: &str) -> Option<ContentTier> {
        self.rankings.get(content_type).copied()
    }

    /// Usable content types ordered best tier first, then by name
    pub fn usable(&self) -> Vec<(&str, ContentTier)> {
        let mut usable: Vec<_> = self
            .rankings
            .iter()
            .filter(|(_, tier)| **tier != ContentTier::Avoid)
            .map(|(name, tier)| (name.as_str(), *tier))
            .collect();
        usable.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        usable
    }

    pub fn with_tier(&self, tier: ContentTier) -> Vec<&str> {
        self.rankings
            .iter()
            .filter(|(_, t)| **t == tier)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }
}

// ============================================================================
// Trends
// ============================================================================

/// Direction of a performance trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    #[default]
    Stable,
    Declining,
}

/// One trailing performance window (7d, 14d, 30d)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendWindow {
    pub window_days: u32,
    /// Audience fatigue (0-100)
    pub saturation: f64,
    /// Growth headroom (0-100)
    pub opportunity: f64,
    /// Observed purchase rate (0-1)
    pub purchase_rate: f64,
    #[serde(default)]
    pub direction: TrendDirection,
    /// Messages observed in the window
    pub sample_size: u32,
    /// Age of the newest observation in days
    #[serde(default)]
    pub days_since_latest: u32,
}

/// Trailing trend history for a creator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceTrends {
    pub windows: Vec<TrendWindow>,
}

impl PerformanceTrends {
    pub fn has_samples(&self) -> bool {
        self.windows.iter().any(|w| w.sample_size > 0)
    }

    /// Direction of the shortest populated window
    pub fn direction(&self) -> TrendDirection {
        self.windows
            .iter()
            .filter(|w| w.sample_size > 0)
            .min_by_key(|w| w.window_days)
            .map(|w| w.direction)
            .unwrap_or_default()
    }
}

/// Audience segments flagged as at-risk by the analytics collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSegment {
    ExpiringSubscribers,
    LapsedBuyers,
    LowEngagement,
    HighValueInactive,
}

impl RiskSegment {
    /// Send types that address this segment
    pub fn addressed_by(&self) -> &'static [&'static str] {
        match self {
            Self::ExpiringSubscribers => &["renew_on_post", "renew_on_message"],
            Self::LapsedBuyers => &["ppv_followup", "flash_bundle", "bundle"],
            Self::LowEngagement => &["dm_farm", "like_farm", "bump_descriptive", "live_promo"],
            Self::HighValueInactive => &["expired_winback", "vip_program", "snapchat_bundle"],
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// One scheduled send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub id: u32,
    pub date: NaiveDate,
    pub day: Weekday,
    pub time: Option<NaiveTime>,
    pub send_type: String,
    pub category: Category,
    pub content_type: Option<String>,
    pub price: Option<f64>,
    pub price_rationale: Option<String>,
    pub expiry: Option<NaiveDateTime>,
    pub parent_item_id: Option<u32>,
}

impl ScheduleItem {
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        self.time.map(|t| self.date.and_time(t))
    }

    pub fn is_followup(&self) -> bool {
        self.parent_item_id.is_some()
    }
}

/// Strategy and flavor metadata carried per day for downstream validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub strategy: crate::allocation::DailyStrategy,
    pub flavor: crate::allocation::DayFlavor,
    /// Set when the timing stage could not resolve the day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_conflict: Option<String>,
}

/// Ordered weekly schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub creator_id: String,
    pub week_start: NaiveDate,
    pub days: Vec<DayPlan>,
    pub items: Vec<ScheduleItem>,
}

impl WeeklySchedule {
    pub fn items_for_day(&self, day: Weekday) -> Vec<&ScheduleItem> {
        self.items.iter().filter(|i| i.day == day).collect()
    }

    pub fn item(&self, id: u32) -> Option<&ScheduleItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn day_plan(&self, day: Weekday) -> Option<&DayPlan> {
        self.days.iter().find(|d| d.weekday == day)
    }

    pub fn has_timing_conflicts(&self) -> bool {
        self.days.iter().any(|d| d.timing_conflict.is_some())
    }

    /// Sort items chronologically, untimed items last within their day
    pub fn sort_chronologically(&mut self) {
        self.items.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| match (a.time, b.time) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    pub fn summary(&self) -> ScheduleSummary {
        let mut by_category = HashMap::new();
        let mut by_type = BTreeMap::new();
        for item in &self.items {
            *by_category.entry(item.category).or_insert(0) += 1;
            *by_type.entry(item.send_type.clone()).or_insert(0) += 1;
        }
        ScheduleSummary {
            week_start: self.week_start,
            total_items: self.items.len(),
            by_category,
            by_type,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Schedule summary statistics
#[derive(Debug, Clone)]
pub struct ScheduleSummary {
    pub week_start: NaiveDate,
    pub total_items: usize,
    pub by_category: HashMap<Category, usize>,
    pub by_type: BTreeMap<String, usize>,
}

/// Monday-based index of a weekday (Mon = 0)
pub fn day_index(day: Weekday) -> usize {
    day.num_days_from_monday() as usize
}

/// Monday on or before the given date
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
