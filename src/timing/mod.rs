//! Timing assignment
//!
//! Places every item of a day in slot order. Independent items start from
//! irregular seeded anchors pulled toward their category's prime band, then
//! get jittered off the quarter hour and pushed forward until every spacing
//! rule holds. Followups sit at their parent's time plus a seeded offset.
//!
//! A day that overflows the active window is retried with tight packing;
//! if that also fails the day is flagged as a timing conflict and its items
//! stay untimed.

pub mod bands;
pub mod jitter;

use chrono::{Duration, NaiveTime, Weekday};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::catalog::SendTypeCatalog;
use crate::config::TimingSettings;
use crate::error::{Issue, Severity};
use crate::models::{Category, WeeklySchedule};

pub use bands::{Band, PrimeBands};
pub use jitter::Jitter;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Largest shift a prime band may apply to an anchor
const MAX_BAND_PULL: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Packing {
    Relaxed,
    Tight,
}

/// Per-slot view used while placing a day
#[derive(Debug, Clone)]
struct SlotSpec {
    send_type: String,
    category: Category,
    /// Index of the parent slot within the day
    parent: Option<usize>,
}

/// Outcome of the timing stage
#[derive(Debug, Clone, Default)]
pub struct TimingReport {
    /// Days that could not be resolved
    pub conflicts: Vec<Issue>,
    /// Days that needed tight packing
    pub tight_days: Vec<Weekday>,
    pub warnings: Vec<String>,
}

/// Assigns times and expiries
pub struct TimingAssigner<'a> {
    catalog: &'a SendTypeCatalog,
    settings: TimingSettings,
}

impl<'a> TimingAssigner<'a> {
    pub fn new(catalog: &'a SendTypeCatalog, settings: TimingSettings) -> Self {
        Self { catalog, settings }
    }

    /// Time every item; `seed` is used unless the settings pin one
    pub fn assign(&self, mut schedule: WeeklySchedule, seed: u64) -> (WeeklySchedule, TimingReport) {
        let seed = self.settings.seed.unwrap_or(seed);
        let mut report = TimingReport::default();
        // Absolute minute (from week start) of the latest send per type
        let mut last_seen: HashMap<String, i64> = HashMap::new();

        for d in 0..schedule.days.len() {
            let plan = schedule.days[d].clone();
            let indices: Vec<usize> = (0..schedule.items.len())
                .filter(|&i| schedule.items[i].date == plan.date)
                .collect();
            if indices.is_empty() {
                continue;
            }

            let slots: Vec<SlotSpec> = indices
                .iter()
                .map(|&i| {
                    let item = &schedule.items[i];
                    SlotSpec {
                        send_type: item.send_type.clone(),
                        category: item.category,
                        parent: item
                            .parent_item_id
                            .and_then(|pid| indices.iter().position(|&j| schedule.items[j].id == pid)),
                    }
                })
                .collect();

            let day_offset = (plan.date - schedule.week_start).num_days() * i64::from(MINUTES_PER_DAY);
            let bands = PrimeBands::for_day(plan.weekday, plan.strategy);
            let mut jitter = Jitter::for_day(seed, d, self.settings.jitter_min, self.settings.jitter_max);

            let placed = match self.place_day(&slots, &bands, &mut jitter, &last_seen, day_offset, Packing::Relaxed) {
                Ok(times) => Ok(times),
                Err(reason) => {
                    debug!(day = %plan.weekday, %reason, "Relaxed placement failed, packing tightly");
                    report.tight_days.push(plan.weekday);
                    self.place_day(&slots, &bands, &mut jitter, &last_seen, day_offset, Packing::Tight)
                }
            };

            match placed {
                Ok(times) => {
                    for (k, &i) in indices.iter().enumerate() {
                        let Some(time) = NaiveTime::from_hms_opt(times[k] / 60, times[k] % 60, 0) else {
                            continue;
                        };
                        let item = &mut schedule.items[i];
                        item.time = Some(time);
                        item.expiry = self
                            .catalog
                            .get(&item.send_type)
                            .and_then(|t| t.ttl_hours)
                            .and_then(|ttl| item.scheduled_at().map(|at| at + Duration::hours(i64::from(ttl))));
                        last_seen.insert(item.send_type.clone(), day_offset + i64::from(times[k]));
                    }
                }
                Err(reason) => {
                    warn!(day = %plan.weekday, %reason, "Timing conflict, day left untimed");
                    schedule.days[d].timing_conflict = Some(reason.clone());
                    report.conflicts.push(Issue::new(Severity::Structural, "timing_conflict", reason).on_day(plan.weekday));
                }
            }
        }

        if !report.tight_days.is_empty() {
            report.warnings.push(format!(
                "ADVISORY: tight packing used on {}",
                report
                    .tight_days
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        schedule.sort_chronologically();
        info!(
            items = schedule.items.len(),
            conflicts = report.conflicts.len(),
            tight_days = report.tight_days.len(),
            "Timing assigned"
        );
        (schedule, report)
    }

    /// Same-type gap for a send type
    pub fn same_type_gap(&self, send_type: &str) -> u32 {
        let type_gap = self.catalog.get(send_type).map_or(0, |t| t.min_gap_minutes());
        self.settings.same_type_gap_minutes.max(type_gap)
    }

    fn followup_range(&self, send_type: &str) -> (u32, u32) {
        self.catalog
            .get(send_type)
            .and_then(|t| t.followup.as_ref())
            .map_or((60, 60), |rule| (rule.min_offset_minutes, rule.max_offset_minutes))
    }

    fn in_dead_zone(&self, minute: u32) -> bool {
        (self.settings.dead_zone_start_minute..self.settings.dead_zone_end_minute).contains(&minute)
    }

    /// Irregular anchors over the active window, pulled toward prime bands
    fn anchors(&self, slots: &[SlotSpec], bands: &PrimeBands, jitter: &mut Jitter) -> Vec<u32> {
        let start = self.settings.dead_zone_end_minute;
        let end = self.settings.window_end_minute;
        let weights: Vec<f64> = (0..=slots.len()).map(|_| jitter.step_weight()).collect();
        let total: f64 = weights.iter().sum();
        let span = f64::from(end.saturating_sub(start));

        let mut acc = 0.0;
        slots
            .iter()
            .zip(&weights)
            .map(|(slot, w)| {
                acc += w;
                let base = f64::from(start) + span * acc / total;
                let pulled = bands
                    .nearest_point(slot.category, base.round() as u32)
                    .map_or(base, |target| {
                        base + ((f64::from(target) - base) / 2.0).clamp(-MAX_BAND_PULL, MAX_BAND_PULL)
                    });
                pulled.round().clamp(f64::from(start), f64::from(end)) as u32
            })
            .collect()
    }

    /// Earliest legal minute for slot `i` given the placed prefix
    fn earliest(&self, slots: &[SlotSpec], times: &[u32], i: usize, last_seen: &HashMap<String, i64>, day_offset: i64) -> u32 {
        let s = &self.settings;
        let send_type = &slots[i].send_type;
        let gap = self.same_type_gap(send_type);
        let mut t = s.dead_zone_end_minute;

        if let Some(&last) = times.last() {
            t = t.max(last + s.global_gap_minutes);
        }
        for (k, prev) in slots[..times.len()].iter().enumerate() {
            if prev.send_type == *send_type {
                t = t.max(times[k] + gap);
            }
        }
        if let Some(&abs) = last_seen.get(send_type) {
            let rel = abs + i64::from(gap) - day_offset;
            if rel > 0 {
                t = t.max(rel as u32);
            }
        }
        let cap = s.max_per_rolling_window;
        if cap > 0 && times.len() >= cap {
            t = t.max(times[times.len() - cap] + s.rolling_window_minutes);
        }
        t
    }

    /// Earliest legal parent minute so its followup, `offset` later, is legal
    fn earliest_for_followup(
        &self,
        followup: &SlotSpec,
        slots: &[SlotSpec],
        times: &[u32],
        offset: u32,
        last_seen: &HashMap<String, i64>,
        day_offset: i64,
    ) -> u32 {
        let s = &self.settings;
        let gap = self.same_type_gap(&followup.send_type);
        let mut t = 0u32;

        for (k, prev) in slots[..times.len()].iter().enumerate() {
            if prev.send_type == followup.send_type {
                t = t.max((times[k] + gap).saturating_sub(offset));
            }
        }
        if let Some(&abs) = last_seen.get(&followup.send_type) {
            let rel = abs + i64::from(gap) - day_offset - i64::from(offset);
            if rel > 0 {
                t = t.max(rel as u32);
            }
        }
        // The followup lands at index len + 1
        let cap = s.max_per_rolling_window;
        if cap >= 2 && times.len() + 1 >= cap {
            t = t.max((times[times.len() + 1 - cap] + s.rolling_window_minutes).saturating_sub(offset));
        }
        t
    }

    /// Move `t` off the quarter hour; relaxed days redraw from the seeded stream
    fn off_quarter(t: u32, packing: Packing, jitter: &mut Jitter, accept: impl Fn(u32) -> bool) -> u32 {
        if accept(t) {
            return t;
        }
        match packing {
            Packing::Relaxed => jitter.push_forward(t, accept),
            Packing::Tight => (t..).find(|&m| accept(m)).unwrap_or(t),
        }
    }

    fn place_day(
        &self,
        slots: &[SlotSpec],
        bands: &PrimeBands,
        jitter: &mut Jitter,
        last_seen: &HashMap<String, i64>,
        day_offset: i64,
        packing: Packing,
    ) -> Result<Vec<u32>, String> {
        let s = &self.settings;
        let anchors = match packing {
            Packing::Relaxed => self.anchors(slots, bands, jitter),
            Packing::Tight => vec![s.dead_zone_end_minute; slots.len()],
        };

        let mut times: Vec<u32> = Vec::with_capacity(slots.len());
        let mut pending_offset: Option<u32> = None;

        for (i, slot) in slots.iter().enumerate() {
            let t = match slot.parent {
                Some(parent) if parent + 1 == i => {
                    let offset = pending_offset
                        .take()
                        .ok_or_else(|| format!("followup {} has no offset", slot.send_type))?;
                    times[parent] + offset
                }
                Some(_) => return Err(format!("followup {} is not directly after its parent", slot.send_type)),
                None => {
                    let mut t = match packing {
                        Packing::Relaxed => jitter.apply(anchors[i]),
                        Packing::Tight => anchors[i],
                    };
                    if self.in_dead_zone(t) {
                        t = s.dead_zone_end_minute;
                    }
                    t = t.max(self.earliest(slots, &times, i, last_seen, day_offset));

                    let followup = slots.get(i + 1).filter(|next| next.parent == Some(i));
                    if let Some(next) = followup {
                        let (lo, hi) = self.followup_range(&next.send_type);
                        let offset = match packing {
                            Packing::Relaxed => jitter.offset_in(lo, hi),
                            Packing::Tight => lo,
                        };
                        t = t.max(self.earliest_for_followup(next, slots, &times, offset, last_seen, day_offset));
                        t = Self::off_quarter(t, packing, jitter, |m| m % 15 != 0 && (m + offset) % 15 != 0);
                        pending_offset = Some(offset);
                    } else {
                        t = Self::off_quarter(t, packing, jitter, |m| m % 15 != 0);
                    }

                    if t > s.window_end_minute {
                        return Err(format!(
                            "{} items do not fit before {:02}:{:02}",
                            slots.len(),
                            s.window_end_minute / 60,
                            s.window_end_minute % 60
                        ));
                    }
                    t
                }
            };
            times.push(t);
        }

        self.verify(slots, &times, last_seen, day_offset)?;
        Ok(times)
    }

    /// Check every spacing rule on a placed day
    fn verify(&self, slots: &[SlotSpec], times: &[u32], last_seen: &HashMap<String, i64>, day_offset: i64) -> Result<(), String> {
        let s = &self.settings;
        for (i, &t) in times.iter().enumerate() {
            let send_type = &slots[i].send_type;
            if t >= MINUTES_PER_DAY {
                return Err(format!("{send_type} spills past midnight"));
            }
            if t % 15 == 0 {
                return Err(format!("{send_type} lands on a quarter hour"));
            }
            if self.in_dead_zone(t) {
                return Err(format!("{send_type} lands in the dead zone"));
            }
            if i > 0 && t < times[i - 1] + s.global_gap_minutes {
                return Err(format!("{send_type} is within {} minutes of the previous send", s.global_gap_minutes));
            }
            let gap = self.same_type_gap(send_type);
            if let Some(k) = (0..i).rev().find(|&k| slots[k].send_type == *send_type) {
                if t < times[k] + gap {
                    return Err(format!("{send_type} repeats within {gap} minutes"));
                }
            }
            if let Some(&abs) = last_seen.get(send_type) {
                if day_offset + i64::from(t) < abs + i64::from(gap) {
                    return Err(format!("{send_type} repeats within {gap} minutes of the previous day"));
                }
            }
            let cap = s.max_per_rolling_window;
            if cap > 0 && i >= cap && t < times[i - cap] + s.rolling_window_minutes {
                return Err(format!(
                    "more than {cap} sends within {} minutes",
                    s.rolling_window_minutes
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::SendTypeAllocator;
    use crate::diversity::DiversityEnforcer;
    use crate::config::DiversitySettings;
    use crate::models::{Creator, PageType};
    use crate::volume::VolumeResolver;
    use chrono::{NaiveDate, Timelike};

    fn schedule_for(creator: &Creator, catalog: &SendTypeCatalog) -> WeeklySchedule {
        let week_start = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let volume = VolumeResolver::default().resolve(creator, None, week_start).unwrap().value;
        let allocation = SendTypeAllocator::new(catalog).allocate(creator, &volume, None).unwrap().value;
        let (allocation, _) = DiversityEnforcer::new(catalog, DiversitySettings::default()).enforce(allocation);
        allocation.into_schedule(&creator.id, catalog)
    }

    fn minutes(t: NaiveTime) -> u32 {
        t.hour() * 60 + t.minute()
    }

    #[test]
    fn test_every_item_timed_off_quarter_hour() {
        let catalog = SendTypeCatalog::default();
        let creator = Creator::new("timing-1", 5, PageType::Paid);
        let assigner = TimingAssigner::new(&catalog, TimingSettings::default());
        let (schedule, report) = assigner.assign(schedule_for(&creator, &catalog), 42);
        assert!(report.conflicts.is_empty());
        for item in &schedule.items {
            let t = item.time.expect("timed");
            assert_ne!(t.minute() % 15, 0);
            assert!(minutes(t) >= 7 * 60);
            assert!(minutes(t) < 24 * 60);
        }
    }

    #[test]
    fn test_spacing_holds_within_days() {
        let catalog = SendTypeCatalog::default();
        let creator = Creator::new("timing-2", 4, PageType::Free);
        let assigner = TimingAssigner::new(&catalog, TimingSettings::default());
        let (schedule, _) = assigner.assign(schedule_for(&creator, &catalog), 7);
        for day in &schedule.days {
            let items = schedule.items_for_day(day.weekday);
            for pair in items.windows(2) {
                let gap = minutes(pair[1].time.unwrap()) - minutes(pair[0].time.unwrap());
                assert!(gap >= 45, "{} -> {}", pair[0].send_type, pair[1].send_type);
            }
            for quad in items.windows(4) {
                assert!(minutes(quad[3].time.unwrap()) >= minutes(quad[0].time.unwrap()) + 150);
            }
            for (i, a) in items.iter().enumerate() {
                for b in &items[i + 1..] {
                    if a.send_type == b.send_type {
                        let gap = minutes(b.time.unwrap()) - minutes(a.time.unwrap());
                        assert!(gap >= assigner.same_type_gap(&a.send_type));
                    }
                }
            }
        }
    }

    #[test]
    fn test_followups_anchor_to_parent() {
        let catalog = SendTypeCatalog::default();
        let creator = Creator::new("timing-3", 3, PageType::Free);
        let assigner = TimingAssigner::new(&catalog, TimingSettings::default());
        let (schedule, _) = assigner.assign(schedule_for(&creator, &catalog), 11);
        for item in schedule.items.iter().filter(|i| i.is_followup()) {
            let parent = schedule.item(item.parent_item_id.unwrap()).unwrap();
            assert_eq!(parent.date, item.date);
            let offset = minutes(item.time.unwrap()) - minutes(parent.time.unwrap());
            assert!((50..=90).contains(&offset), "offset {offset}");
        }
    }

    #[test]
    fn test_expiry_follows_ttl() {
        let catalog = SendTypeCatalog::default();
        let creator = Creator::new("timing-4", 3, PageType::Paid);
        let assigner = TimingAssigner::new(&catalog, TimingSettings::default());
        let (schedule, _) = assigner.assign(schedule_for(&creator, &catalog), 5);
        for item in &schedule.items {
            match catalog.get(&item.send_type).unwrap().ttl_hours {
                Some(ttl) => assert_eq!(
                    item.expiry.unwrap() - item.scheduled_at().unwrap(),
                    Duration::hours(i64::from(ttl))
                ),
                None => assert!(item.expiry.is_none()),
            }
        }
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let catalog = SendTypeCatalog::default();
        let creator = Creator::new("timing-5", 2, PageType::Free);
        let settings = TimingSettings {
            seed: Some(2024),
            ..TimingSettings::default()
        };
        let assigner = TimingAssigner::new(&catalog, settings);
        let (a, _) = assigner.assign(schedule_for(&creator, &catalog), 1);
        let (b, _) = assigner.assign(schedule_for(&creator, &catalog), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_impossible_day_flags_conflict() {
        let catalog = SendTypeCatalog::default();
        let creator = Creator::new("timing-6", 5, PageType::Paid);
        let settings = TimingSettings {
            global_gap_minutes: 240,
            ..TimingSettings::default()
        };
        let assigner = TimingAssigner::new(&catalog, settings);
        let (schedule, report) = assigner.assign(schedule_for(&creator, &catalog), 3);
        assert!(!report.conflicts.is_empty());
        assert!(schedule.has_timing_conflicts());
        for day in schedule.days.iter().filter(|d| d.timing_conflict.is_some()) {
            assert!(schedule.items_for_day(day.weekday).iter().all(|i| i.time.is_none()));
        }
    }
}
