//! Greedy repair steps
//!
//! Every step moves or swaps a single slot. Followup slots and the parent
//! slot directly before a followup never move.

use std::cmp::Reverse;
use tracing::debug;

use super::DiversityMetrics;
use crate::allocation::{AllocationSlot, DayAllocation, WeeklyAllocation};
use crate::catalog::{SendType, SendTypeCatalog};
use crate::config::DiversitySettings;
use crate::models::{day_index, Category, PageType};
use chrono::Weekday;

/// What a transfer should achieve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferTarget {
    /// Introduce an unused type, optionally restricted to one category
    NewType(Option<Category>),
    /// Shrink types holding more than `above` slots
    Flatten { above: u32 },
}

/// Transfer goals for the current metrics, most pressing first
pub fn transfer_targets(m: &DiversityMetrics, page_type: PageType, s: &DiversitySettings) -> Vec<TransferTarget> {
    let mut targets = Vec::new();
    if m.unique_types < s.min_unique_types {
        targets.push(TransferTarget::NewType(None));
    }
    for (category, actual, required) in m.category_floors(page_type, s) {
        if actual < required {
            targets.push(TransferTarget::NewType(Some(category)));
        }
    }
    if m.max_concentration > s.concentration_target {
        targets.push(TransferTarget::Flatten {
            above: (s.concentration_target * m.total as f64).floor() as u32,
        });
    }
    targets
}

fn movable(day: &DayAllocation, pos: usize, catalog: &SendTypeCatalog) -> bool {
    !day.is_followup_at(pos, catalog) && !day.is_load_bearing(pos, catalog)
}

/// Content for a slot switching to `send_type`
fn content_for(day: &DayAllocation, removed: &AllocationSlot, send_type: &SendType) -> Option<String> {
    if !send_type.requires_media {
        return None;
    }
    removed
        .content_type
        .clone()
        .or_else(|| day.slots.iter().find_map(|s| s.content_type.clone()))
        .or_else(|| Some(day.flavor.emphasis.clone()))
}

/// Replace the slot at `pos` with the first legal type in `candidates`
fn replace_at(
    week: &mut WeeklyAllocation,
    day: usize,
    pos: usize,
    candidates: &[&SendType],
) -> Option<String> {
    let removed = week.days[day].slots.remove(pos);
    for candidate in candidates {
        if week.can_place(candidate, day) {
            let slot = AllocationSlot {
                send_type: candidate.key.clone(),
                category: candidate.category,
                content_type: content_for(&week.days[day], &removed, candidate),
            };
            week.days[day].slots.insert(pos, slot);
            return Some(removed.send_type);
        }
    }
    week.days[day].slots.insert(pos, removed);
    None
}

/// Move one slot from the most over-represented type to an under-represented one
pub fn transfer_once(week: &mut WeeklyAllocation, catalog: &SendTypeCatalog, target: TransferTarget) -> bool {
    let counts = week.weekly_counts();
    let mut sources: Vec<(&String, u32)> = counts.iter().map(|(k, n)| (k, *n)).collect();
    sources.sort_by_key(|(key, n)| (Reverse(*n), catalog.position(key)));

    for (source, n) in sources {
        let Some(source_type) = catalog.get(source) else {
            continue;
        };
        if n < 2 || source_type.is_followup() {
            continue;
        }
        match target {
            TransferTarget::NewType(Some(category)) if source_type.category != category => continue,
            TransferTarget::Flatten { above } if n <= above => continue,
            _ => {}
        }

        let mut dests: Vec<&SendType> = catalog
            .eligible_in(week.page_type, source_type.category)
            .into_iter()
            .filter(|t| !t.is_followup() && t.key != source_type.key)
            .filter(|t| {
                let count = week.weekly_count(&t.key);
                match target {
                    TransferTarget::NewType(_) => count == 0,
                    TransferTarget::Flatten { .. } => count + 1 < n,
                }
            })
            .collect();
        dests.sort_by_key(|t| (week.weekly_count(&t.key), catalog.position(&t.key)));
        if dests.is_empty() {
            continue;
        }

        let mut days: Vec<usize> = (0..week.days.len())
            .filter(|&d| week.days[d].count_of(source) > 0)
            .collect();
        days.sort_by_key(|&d| (Reverse(week.days[d].count_of(source)), d));

        for day in days {
            let Some(pos) = (0..week.days[day].slots.len())
                .rev()
                .find(|&p| week.days[day].slots[p].send_type == *source && movable(&week.days[day], p, catalog))
            else {
                continue;
            };
            if let Some(from) = replace_at(week, day, pos, &dests) {
                debug!(
                    day = %week.days[day].weekday,
                    from = %from,
                    to = %week.days[day].slots[pos].send_type,
                    "Transferred slot"
                );
                return true;
            }
        }
    }
    false
}

/// Swap a repeated type in a flat day for one the day lacks
pub fn diversify_flat_day(week: &mut WeeklyAllocation, catalog: &SendTypeCatalog, flat_days: &[(Weekday, usize)]) -> bool {
    for &(weekday, _) in flat_days {
        let day = day_index(weekday);
        if day >= week.days.len() {
            continue;
        }
        let mut repeated: Vec<(String, u32)> = week.days[day]
            .counts()
            .into_iter()
            .filter(|(_, n)| *n >= 2)
            .collect();
        repeated.sort_by_key(|(key, n)| (Reverse(*n), catalog.position(key)));

        for (key, _) in repeated {
            let Some(category) = catalog.get(&key).map(|t| t.category) else {
                continue;
            };
            let Some(pos) = (0..week.days[day].slots.len())
                .rev()
                .find(|&p| week.days[day].slots[p].send_type == key && movable(&week.days[day], p, catalog))
            else {
                continue;
            };

            let mut candidates: Vec<&SendType> = catalog
                .eligible_in(week.page_type, category)
                .into_iter()
                .filter(|t| !t.is_followup() && week.days[day].count_of(&t.key) == 0)
                .collect();
            candidates.sort_by_key(|t| (week.weekly_count(&t.key), catalog.position(&t.key)));

            if let Some(from) = replace_at(week, day, pos, &candidates) {
                debug!(day = %weekday, from = %from, "Diversified flat day");
                return true;
            }
        }
    }
    false
}

/// Longest run of one type within a day
pub fn longest_run(day: &DayAllocation) -> Option<(String, usize)> {
    let mut best: Option<(String, usize)> = None;
    let mut start = 0;
    for end in 1..=day.slots.len() {
        if end == day.slots.len() || day.slots[end].send_type != day.slots[start].send_type {
            let len = end - start;
            if best.as_ref().map_or(true, |(_, b)| len > *b) {
                best = Some((day.slots[start].send_type.clone(), len));
            }
            start = end;
        }
    }
    best
}

/// Break runs longer than `max_run` by swapping with the nearest different slot
///
/// Later slots are preferred over earlier ones. Returns the number of swaps.
pub fn break_runs(day: &mut DayAllocation, catalog: &SendTypeCatalog, max_run: usize) -> usize {
    let max_run = max_run.max(1);
    let len = day.slots.len();
    let mut swaps = 0;
    let mut budget = len * len;
    let mut p = max_run;

    while p < len && budget > 0 {
        budget -= 1;
        let key = day.slots[p].send_type.clone();
        if !day.slots[p - max_run..p].iter().all(|s| s.send_type == key) {
            p += 1;
            continue;
        }

        let run_start = p - max_run;
        let swap = (run_start + 1..=p)
            .rev()
            .filter(|&i| movable(day, i, catalog))
            .find_map(|i| {
                let later = (p + 1..len).find(|&q| day.slots[q].send_type != key && movable(day, q, catalog));
                let earlier = (0..run_start)
                    .rev()
                    .find(|&q| day.slots[q].send_type != key && movable(day, q, catalog));
                later.or(earlier).map(|q| (i, q))
            });

        match swap {
            Some((i, q)) => {
                day.slots.swap(i, q);
                swaps += 1;
                debug!(day = %day.weekday, send_type = %key, from = i, to = q, "Broke consecutive run");
                p = max_run;
            }
            None => p += 1,
        }
    }
    swaps
}
