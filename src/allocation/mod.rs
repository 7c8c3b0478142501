//! Send-type allocation
//!
//! Distributes each day's target count across the send-type catalog. The
//! result is a [`WeeklyAllocation`]: for every day an ordered list of slots
//! (the day's send sequence) plus the day's strategy and content flavor.
//!
//! # Modules
//!
//! - [`strategy`] - Closed daily strategy enum, weekday table, anti-repeat check
//! - [`flavor`] - Weekday content flavor table and ranking/signal overrides
//! - [`allocator`] - The allocator itself and the weekly category rebalance

pub mod allocator;
pub mod flavor;
pub mod strategy;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::catalog::{SendType, SendTypeCatalog};
use crate::error::{SendplanErrorTrait, Severity};
use crate::models::{Category, PageType, ScheduleItem, WeeklySchedule, DayPlan};

pub use allocator::SendTypeAllocator;
pub use flavor::{DayFlavor, FlavorSignals};
pub use strategy::{assign_strategies, validate_rotation, DailyStrategy};

/// Errors raised while allocating send types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Strategy {strategy} repeats on consecutive days ending {day}")]
    StrategyRepeat { day: Weekday, strategy: DailyStrategy },

    #[error("Only {distinct} distinct strategies, at least {required} required")]
    InsufficientStrategies { distinct: usize, required: usize },

    #[error("No send types in the catalog are eligible for {page_type} pages")]
    EmptyCatalog { page_type: PageType },
}

impl SendplanErrorTrait for AllocationError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Structural
    }
}

/// One send in a day's sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSlot {
    pub send_type: String,
    pub category: Category,
    pub content_type: Option<String>,
}

/// A single day's allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAllocation {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub strategy: DailyStrategy,
    pub flavor: DayFlavor,
    pub slots: Vec<AllocationSlot>,
}

impl DayAllocation {
    pub fn count_of(&self, key: &str) -> u32 {
        self.slots.iter().filter(|s| s.send_type == key).count() as u32
    }

    /// (send_type, count) in order of first appearance
    pub fn counts(&self) -> Vec<(String, u32)> {
        let mut counts: Vec<(String, u32)> = Vec::new();
        for slot in &self.slots {
            match counts.iter_mut().find(|(k, _)| *k == slot.send_type) {
                Some((_, n)) => *n += 1,
                None => counts.push((slot.send_type.clone(), 1)),
            }
        }
        counts
    }

    pub fn distinct_types(&self) -> usize {
        self.counts().len()
    }

    /// A parent slot whose next slot is its followup
    pub fn is_load_bearing(&self, pos: usize, catalog: &SendTypeCatalog) -> bool {
        self.slots.get(pos + 1).is_some_and(|next| {
            catalog.get(&next.send_type).is_some_and(SendType::is_followup)
        })
    }

    pub fn is_followup_at(&self, pos: usize, catalog: &SendTypeCatalog) -> bool {
        self.slots
            .get(pos)
            .and_then(|s| catalog.get(&s.send_type))
            .is_some_and(SendType::is_followup)
    }

    /// First parent slot not yet followed by a followup
    pub fn unfollowed_parent(&self, catalog: &SendTypeCatalog) -> Option<usize> {
        (0..self.slots.len()).find(|&pos| {
            catalog.is_parent_type(&self.slots[pos].send_type) && !self.is_load_bearing(pos, catalog)
        })
    }
}

/// Weekly allocation, Monday first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAllocation {
    pub week_start: NaiveDate,
    pub page_type: PageType,
    pub days: Vec<DayAllocation>,
}

impl WeeklyAllocation {
    pub fn total(&self) -> usize {
        self.days.iter().map(|d| d.slots.len()).sum()
    }

    pub fn weekly_count(&self, key: &str) -> u32 {
        self.days.iter().map(|d| d.count_of(key)).sum()
    }

    pub fn weekly_counts(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for slot in self.days.iter().flat_map(|d| &d.slots) {
            *counts.entry(slot.send_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn category_total(&self, category: Category) -> usize {
        self.days
            .iter()
            .flat_map(|d| &d.slots)
            .filter(|s| s.category == category)
            .count()
    }

    /// Whether one more `send_type` may be placed on `day`
    pub fn can_place(&self, send_type: &SendType, day: usize) -> bool {
        if !send_type.allowed_on(self.page_type) {
            return false;
        }
        if self.days[day].count_of(&send_type.key) >= send_type.max_per_day {
            return false;
        }
        if self.weekly_count(&send_type.key) >= send_type.max_per_week {
            return false;
        }
        if send_type.needs_rest_day() {
            let neighbours = [day.checked_sub(1), Some(day + 1)];
            if neighbours
                .into_iter()
                .flatten()
                .filter_map(|d| self.days.get(d))
                .any(|d| d.count_of(&send_type.key) > 0)
            {
                return false;
            }
        }
        true
    }

    /// Expand into schedule items; followups link to the parent slot before them
    pub fn into_schedule(self, creator_id: &str, catalog: &SendTypeCatalog) -> WeeklySchedule {
        let mut items = Vec::with_capacity(self.total());
        let mut days = Vec::with_capacity(self.days.len());
        let mut next_id = 1u32;

        for day in self.days {
            let mut previous_id: Option<u32> = None;
            for slot in day.slots {
                let is_followup = catalog.get(&slot.send_type).is_some_and(SendType::is_followup);
                items.push(ScheduleItem {
                    id: next_id,
                    date: day.date,
                    day: day.weekday,
                    time: None,
                    send_type: slot.send_type,
                    category: slot.category,
                    content_type: slot.content_type,
                    price: None,
                    price_rationale: None,
                    expiry: None,
                    parent_item_id: if is_followup { previous_id } else { None },
                });
                previous_id = Some(next_id);
                next_id += 1;
            }
            days.push(DayPlan {
                date: day.date,
                weekday: day.weekday,
                strategy: day.strategy,
                flavor: day.flavor,
                timing_conflict: None,
            });
        }

        WeeklySchedule {
            creator_id: creator_id.to_string(),
            week_start: self.week_start,
            days,
            items,
        }
    }
}
