//! Compliance scorer
//!
//! Starts at 100 and deducts per broken rule. Each rule is charged once no
//! matter how many items break it, except per-day variety which is charged
//! per day; every offending item is still itemised as an issue.

use chrono::{NaiveTime, Timelike};
use std::collections::{BTreeMap, HashMap};

use super::{ScheduleSnapshot, Scorer, ScorerReport};
use crate::config::{DiversitySettings, ScorerCutoffs, TimingSettings};
use crate::error::{Issue, Severity};
use crate::models::{Category, ContentTier, PageType, ScheduleItem};

// Deduction table
const UNIQUE_TYPES: f64 = 25.0;
const CONCENTRATION: f64 = 20.0;
const CONCENTRATION_SOFT: f64 = 5.0;
const CATEGORY_BALANCE: f64 = 10.0;
const CATEGORY_SHARE: f64 = 5.0;
const DAILY_VARIETY: f64 = 5.0;
const TYPE_CAPS: f64 = 10.0;
const GLOBAL_GAP: f64 = 15.0;
const SAME_TYPE_GAP: f64 = 10.0;
const ROLLING_WINDOW: f64 = 10.0;
const ROUND_MINUTE: f64 = 10.0;
const DEAD_ZONE: f64 = 10.0;
const UNTIMED: f64 = 20.0;
const MISSING_PRICE: f64 = 15.0;
const PRICE_BOUNDS: f64 = 15.0;
const MISSING_CONTENT: f64 = 10.0;
const AVOIDED_CONTENT: f64 = 15.0;
const FOLLOWUP_LINK: f64 = 15.0;
const PAGE_RESTRICTION: f64 = 25.0;
const UNKNOWN_TYPE: f64 = 25.0;

fn minute_of(time: NaiveTime) -> i64 {
    i64::from(time.hour() * 60 + time.minute())
}

/// Deductions and issues collected during one evaluation
#[derive(Default)]
struct Ledger {
    deductions: BTreeMap<String, f64>,
    issues: Vec<Issue>,
}

impl Ledger {
    /// Deduct once per rule
    fn flag(&mut self, rule: &str, points: f64, issue: Issue) {
        self.deductions.entry(rule.to_string()).or_insert(points);
        self.issues.push(issue);
    }

    /// Deduct on every occurrence
    fn charge(&mut self, rule: &str, points: f64, issue: Issue) {
        *self.deductions.entry(rule.to_string()).or_insert(0.0) += points;
        self.issues.push(issue);
    }

    fn structural(&mut self, rule: &str, points: f64, item: &ScheduleItem, message: String) {
        self.flag(
            rule,
            points,
            Issue::new(Severity::Structural, rule, message)
                .on_day(item.day)
                .for_item(item.id),
        );
    }
}

pub struct ComplianceScorer {
    cutoffs: ScorerCutoffs,
    diversity: DiversitySettings,
    timing: TimingSettings,
}

impl ComplianceScorer {
    pub fn new(cutoffs: ScorerCutoffs, diversity: DiversitySettings, timing: TimingSettings) -> Self {
        Self {
            cutoffs,
            diversity,
            timing,
        }
    }

    fn check_diversity(&self, snap: &ScheduleSnapshot, ledger: &mut Ledger) {
        let items = &snap.schedule.items;
        let total = items.len();
        if total == 0 {
            ledger.flag(
                "unique_types",
                UNIQUE_TYPES,
                Issue::new(Severity::Structural, "unique_types", "schedule is empty"),
            );
            return;
        }
        let s = &self.diversity;

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for item in items {
            *counts.entry(item.send_type.as_str()).or_insert(0) += 1;
        }
        if counts.len() < s.min_unique_types {
            ledger.flag(
                "unique_types",
                UNIQUE_TYPES,
                Issue::new(
                    Severity::Structural,
                    "unique_types",
                    format!("{} unique send types, at least {} required", counts.len(), s.min_unique_types),
                ),
            );
        }

        for (key, &n) in &counts {
            let share = n as f64 / total as f64;
            if share > s.concentration_ceiling {
                ledger.flag(
                    "concentration",
                    CONCENTRATION,
                    Issue::new(
                        Severity::Structural,
                        "concentration",
                        format!("{key} is {:.1}% of the week", share * 100.0),
                    ),
                );
            } else if share > s.concentration_target {
                ledger.flag(
                    "concentration_soft",
                    CONCENTRATION_SOFT,
                    Issue::new(
                        Severity::Advisory,
                        "concentration",
                        format!("{key} is {:.1}% of the week", share * 100.0),
                    ),
                );
            }
        }

        let mut floors = vec![
            (Category::Revenue, s.min_revenue_types),
            (Category::Engagement, s.min_engagement_types),
        ];
        if snap.page_type == PageType::Paid {
            floors.push((Category::Retention, s.min_retention_types));
        }
        for (category, required) in floors {
            let unique = counts
                .keys()
                .filter(|k| snap.catalog.get(k).is_some_and(|t| t.category == category))
                .count();
            if unique < required {
                ledger.charge(
                    "category_balance",
                    CATEGORY_BALANCE,
                    Issue::new(
                        Severity::Structural,
                        "category_balance",
                        format!("{unique} unique {category} types, {required} required"),
                    ),
                );
            }
        }

        let share = |c: Category| items.iter().filter(|i| i.category == c).count() as f64 / total as f64;
        for (category, ok) in [
            (Category::Revenue, share(Category::Revenue) >= 0.40),
            (Category::Engagement, share(Category::Engagement) >= 0.25),
            (Category::Retention, share(Category::Retention) <= 0.20),
        ] {
            if !ok {
                ledger.charge(
                    "category_share",
                    CATEGORY_SHARE,
                    Issue::new(
                        Severity::Advisory,
                        "category_share",
                        format!("{category} is {:.0}% of the week", share(category) * 100.0),
                    ),
                );
            }
        }

        for plan in &snap.schedule.days {
            let mut day_types: Vec<&str> = items
                .iter()
                .filter(|i| i.date == plan.date)
                .map(|i| i.send_type.as_str())
                .collect();
            day_types.sort_unstable();
            day_types.dedup();
            if day_types.len() < s.min_daily_types {
                ledger.charge(
                    "daily_variety",
                    DAILY_VARIETY,
                    Issue::new(
                        Severity::Structural,
                        "daily_variety",
                        format!("{} distinct types, {} required", day_types.len(), s.min_daily_types),
                    )
                    .on_day(plan.weekday),
                );
            }
        }
    }

    fn check_items(&self, snap: &ScheduleSnapshot, ledger: &mut Ledger) {
        let mut weekly: HashMap<&str, u32> = HashMap::new();
        let mut daily: HashMap<(chrono::NaiveDate, &str), u32> = HashMap::new();

        for item in &snap.schedule.items {
            let Some(send_type) = snap.catalog.get(&item.send_type) else {
                ledger.structural("unknown_type", UNKNOWN_TYPE, item, format!("unknown send type {}", item.send_type));
                continue;
            };

            *weekly.entry(item.send_type.as_str()).or_insert(0) += 1;
            let today = daily.entry((item.date, item.send_type.as_str())).or_insert(0);
            *today += 1;
            if *today == send_type.max_per_day + 1 {
                ledger.structural(
                    "type_caps",
                    TYPE_CAPS,
                    item,
                    format!("{} exceeds {} per day", item.send_type, send_type.max_per_day),
                );
            }

            if !send_type.allowed_on(snap.page_type) {
                ledger.structural(
                    "page_restriction",
                    PAGE_RESTRICTION,
                    item,
                    format!("{} is not allowed on {} pages", item.send_type, snap.page_type),
                );
            }

            if let Some(bounds) = send_type.price.filter(|_| send_type.requires_price) {
                match item.price {
                    None => ledger.structural("missing_price", MISSING_PRICE, item, format!("{} has no price", item.send_type)),
                    Some(p) if p < bounds.floor || p > bounds.ceiling => ledger.structural(
                        "price_bounds",
                        PRICE_BOUNDS,
                        item,
                        format!("${p:.2} outside [{:.0}, {:.0}]", bounds.floor, bounds.ceiling),
                    ),
                    Some(_) => {}
                }
            }

            match &item.content_type {
                None if send_type.requires_media => ledger.structural(
                    "missing_content",
                    MISSING_CONTENT,
                    item,
                    format!("{} requires media but has no content type", item.send_type),
                ),
                Some(c) if snap.rankings.tier_of(c) == Some(ContentTier::Avoid) => ledger.structural(
                    "avoided_content",
                    AVOIDED_CONTENT,
                    item,
                    format!("content {c} is ranked AVOID"),
                ),
                _ => {}
            }

            match item.time {
                None => ledger.structural("untimed", UNTIMED, item, String::from("item has no scheduled time")),
                Some(t) => {
                    if t.minute() % 15 == 0 {
                        ledger.structural("round_minute", ROUND_MINUTE, item, format!("scheduled on the quarter hour {t}"));
                    }
                    let m = minute_of(t);
                    if m >= i64::from(self.timing.dead_zone_start_minute) && m < i64::from(self.timing.dead_zone_end_minute) {
                        ledger.structural("dead_zone", DEAD_ZONE, item, format!("scheduled in the dead zone at {t}"));
                    }
                }
            }

            self.check_followup(snap, item, ledger);
        }

        for (key, n) in weekly {
            if let Some(t) = snap.catalog.get(key).filter(|t| n > t.max_per_week) {
                ledger.flag(
                    "type_caps",
                    TYPE_CAPS,
                    Issue::new(
                        Severity::Structural,
                        "type_caps",
                        format!("{key} appears {n} times, weekly max {}", t.max_per_week),
                    ),
                );
            }
        }

        for plan in snap.schedule.days.iter().filter(|d| d.timing_conflict.is_some()) {
            ledger.flag(
                "untimed",
                UNTIMED,
                Issue::new(
                    Severity::Structural,
                    "timing_conflict",
                    plan.timing_conflict.clone().unwrap_or_default(),
                )
                .on_day(plan.weekday),
            );
        }
    }

    fn check_followup(&self, snap: &ScheduleSnapshot, item: &ScheduleItem, ledger: &mut Ledger) {
        let rule = snap.catalog.get(&item.send_type).and_then(|t| t.followup.as_ref());
        match (rule, item.parent_item_id) {
            (None, None) => {}
            (None, Some(_)) => ledger.structural(
                "followup_link",
                FOLLOWUP_LINK,
                item,
                format!("{} is not a followup type but has a parent", item.send_type),
            ),
            (Some(_), None) => ledger.structural("followup_link", FOLLOWUP_LINK, item, String::from("followup without parent")),
            (Some(rule), Some(pid)) => {
                let Some(parent) = snap.schedule.item(pid) else {
                    ledger.structural("followup_link", FOLLOWUP_LINK, item, format!("parent {pid} does not exist"));
                    return;
                };
                if !rule.parents.contains(&parent.send_type) {
                    ledger.structural(
                        "followup_link",
                        FOLLOWUP_LINK,
                        item,
                        format!("parent {pid} is a {}, not a valid parent type", parent.send_type),
                    );
                }
                if parent.date != item.date {
                    ledger.structural("followup_link", FOLLOWUP_LINK, item, format!("parent {pid} is on another day"));
                    return;
                }
                if let (Some(p), Some(t)) = (parent.time, item.time) {
                    let offset = minute_of(t) - minute_of(p);
                    if offset <= 0 {
                        ledger.structural("followup_link", FOLLOWUP_LINK, item, format!("scheduled before parent {pid}"));
                    } else if offset < i64::from(rule.min_offset_minutes) || offset > i64::from(rule.max_offset_minutes) {
                        ledger.structural(
                            "followup_link",
                            FOLLOWUP_LINK,
                            item,
                            format!("{offset} minutes after parent, expected {}-{}", rule.min_offset_minutes, rule.max_offset_minutes),
                        );
                    }
                }
            }
        }
    }

    fn check_spacing(&self, snap: &ScheduleSnapshot, ledger: &mut Ledger) {
        let s = &self.timing;
        let week_start = snap.schedule.week_start;
        let mut timed: Vec<(i64, &ScheduleItem)> = snap
            .schedule
            .items
            .iter()
            .filter_map(|i| {
                let t = i.time?;
                Some(((i.date - week_start).num_days() * 1440 + minute_of(t), i))
            })
            .collect();
        timed.sort_by_key(|(at, item)| (*at, item.id));

        let mut last_of_type: HashMap<&str, i64> = HashMap::new();
        for (k, &(at, item)) in timed.iter().enumerate() {
            if k > 0 {
                let (prev_at, prev) = timed[k - 1];
                if prev.date == item.date && at - prev_at < i64::from(s.global_gap_minutes) {
                    ledger.structural(
                        "global_gap",
                        GLOBAL_GAP,
                        item,
                        format!("{} minutes after item {}", at - prev_at, prev.id),
                    );
                }
            }
            let cap = s.max_per_rolling_window;
            if cap > 0 && k >= cap {
                let (window_start, first) = timed[k - cap];
                if first.date == item.date && at - window_start < i64::from(s.rolling_window_minutes) {
                    ledger.structural(
                        "rolling_window",
                        ROLLING_WINDOW,
                        item,
                        format!("more than {cap} sends within {} minutes", s.rolling_window_minutes),
                    );
                }
            }

            let gap = snap
                .catalog
                .get(&item.send_type)
                .map_or(0, |t| t.min_gap_minutes())
                .max(s.same_type_gap_minutes);
            if let Some(prev_at) = last_of_type.insert(item.send_type.as_str(), at) {
                if at - prev_at < i64::from(gap) {
                    ledger.structural(
                        "same_type_gap",
                        SAME_TYPE_GAP,
                        item,
                        format!("{} repeats after {} minutes, minimum {gap}", item.send_type, at - prev_at),
                    );
                }
            }
        }
    }
}

impl Scorer for ComplianceScorer {
    fn name(&self) -> &'static str {
        "compliance"
    }

    fn evaluate(&self, snapshot: &ScheduleSnapshot) -> ScorerReport {
        let mut ledger = Ledger::default();
        self.check_diversity(snapshot, &mut ledger);
        self.check_items(snapshot, &mut ledger);
        self.check_spacing(snapshot, &mut ledger);

        let deducted: f64 = ledger.deductions.values().sum();
        let mut report = ScorerReport::from_score(self.name(), 100.0 - deducted, &self.cutoffs);
        report.breakdown = ledger.deductions;
        report.issues = ledger.issues;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::tests_support::snapshot;

    fn scorer() -> ComplianceScorer {
        let defaults = crate::config::ValidationSettings::default();
        ComplianceScorer::new(defaults.compliance, DiversitySettings::default(), TimingSettings::default())
    }

    #[test]
    fn test_planned_schedule_has_no_hard_violations() {
        let snap = snapshot();
        let report = scorer().evaluate(&snap);
        let hard: Vec<_> = report.issues.iter().filter(|i| i.severity >= Severity::Structural).collect();
        assert!(hard.is_empty(), "{hard:?}");
        assert_eq!(report.status, crate::validation::VerdictStatus::Approved);
    }

    #[test]
    fn test_round_minute_and_gap_deducted() {
        let mut snap = snapshot();
        let first = snap.schedule.items[0].clone();
        let second = &mut snap.schedule.items[1];
        second.time = Some(first.time.unwrap() + chrono::Duration::minutes(20));
        let report = scorer().evaluate(&snap);
        assert!(report.breakdown.contains_key("global_gap"));
        assert!(report.score <= 85.0);
    }

    #[test]
    fn test_missing_price_and_page_restriction() {
        let mut snap = snapshot();
        let revenue = snap
            .schedule
            .items
            .iter_mut()
            .find(|i| i.category == Category::Revenue)
            .unwrap();
        revenue.price = None;
        revenue.send_type = String::from("vip_program");
        revenue.content_type = None;
        let report = scorer().evaluate(&snap);
        assert!(report.breakdown.contains_key("missing_price"));
        assert!(report.breakdown.contains_key("page_restriction"));
        assert!(report.score <= 60.0);
    }

    #[test]
    fn test_untimed_day_fails_hard() {
        let mut snap = snapshot();
        for item in snap.schedule.items.iter_mut() {
            item.time = None;
        }
        snap.schedule.days[0].timing_conflict = Some(String::from("overflow"));
        let report = scorer().evaluate(&snap);
        assert!(report.breakdown.contains_key("untimed"));
        assert!(report.issues.iter().any(|i| i.constraint == "timing_conflict"));
    }

    #[test]
    fn test_soft_concentration_deducted() {
        let mut snap = snapshot();
        let total = snap.schedule.items.len();
        let target = total / 5;
        assert!(target as f64 / total as f64 > 0.15);

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for item in &snap.schedule.items {
            *counts.entry(item.send_type.clone()).or_insert(0) += 1;
        }
        let (key, mut count) = counts.into_iter().max_by_key(|(_, n)| *n).unwrap();
        let category = snap.schedule.items.iter().find(|i| i.send_type == key).unwrap().category;
        for item in snap.schedule.items.iter_mut() {
            if count >= target {
                break;
            }
            if item.send_type != key && item.parent_item_id.is_none() {
                item.send_type = key.clone();
                item.category = category;
                count += 1;
            }
        }

        let report = scorer().evaluate(&snap);
        assert_eq!(report.breakdown.get("concentration_soft"), Some(&CONCENTRATION_SOFT));
        assert!(!report.breakdown.contains_key("concentration"));
        assert!(report
            .issues
            .iter()
            .any(|i| i.constraint == "concentration" && i.severity == Severity::Advisory));
    }
}
