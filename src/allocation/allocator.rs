//! Send-type allocator
//!
//! Fills each day's sequence from the strategy's category order, choosing
//! for every slot the least-used legal send type of that category. Followups
//! are inserted directly after an unfollowed PPV parent. A final pass keeps
//! the weekly category mix within its floors and ceilings.

use tracing::{debug, info, warn};

use super::flavor::{self, FlavorSignals};
use super::strategy::{self, weekday_at};
use super::{AllocationError, AllocationSlot, DayAllocation, WeeklyAllocation};
use crate::catalog::{SendType, SendTypeCatalog};
use crate::models::{Category, ContentRankings, Creator};
use crate::volume::{Resolved, VolumeConfig};

/// Weekly revenue share floor
pub const REVENUE_FLOOR: f64 = 0.40;
/// Weekly engagement share floor
pub const ENGAGEMENT_FLOOR: f64 = 0.25;
/// Weekly retention share ceiling
pub const RETENTION_CEILING: f64 = 0.20;

/// Allocates send types across the week
pub struct SendTypeAllocator<'a> {
    catalog: &'a SendTypeCatalog,
}

impl<'a> SendTypeAllocator<'a> {
    pub fn new(catalog: &'a SendTypeCatalog) -> Self {
        Self { catalog }
    }

    pub fn allocate(
        &self,
        creator: &Creator,
        volume: &VolumeConfig,
        rankings: Option<&ContentRankings>,
    ) -> Result<Resolved<WeeklyAllocation>, AllocationError> {
        let page_type = creator.page_type;
        if self.catalog.eligible(page_type).next().is_none() {
            return Err(AllocationError::EmptyCatalog { page_type });
        }

        let mut warnings = Vec::new();
        let fallback;
        let rankings = match rankings.filter(|r| !r.is_empty()) {
            Some(r) => r,
            None => {
                warn!(creator = %creator.id, "Content rankings missing, treating defaults as MID");
                warnings.push(String::from(
                    "DEGRADED: no content rankings; default content types treated as MID",
                ));
                fallback = flavor::fallback_rankings();
                &fallback
            }
        };

        let seed = strategy::rotation_seed(creator.seed(), volume.week_start);
        let strategies = strategy::assign_strategies(seed, page_type)?;
        let flavors = flavor::resolve_week(
            rankings,
            FlavorSignals {
                opportunity: volume.fused_opportunity,
                confidence: volume.confidence_score,
            },
        );

        let mut week = WeeklyAllocation {
            week_start: volume.week_start,
            page_type,
            days: strategies
                .iter()
                .zip(flavors)
                .enumerate()
                .map(|(i, (strategy, flavor))| DayAllocation {
                    date: volume.week_start + chrono::Duration::days(i as i64),
                    weekday: weekday_at(i),
                    strategy: *strategy,
                    flavor,
                    slots: Vec::new(),
                })
                .collect(),
        };

        for day in 0..week.days.len() {
            let target = volume.daily_targets[day];
            let strategy = week.days[day].strategy;
            let (revenue, engagement, retention) = strategy.split(target);
            let order = strategy.category_order(revenue, engagement, retention);

            for category in order {
                if !self.place(&mut week, day, category) {
                    warnings.push(format!(
                        "{}: no legal send type left for a {} slot; day shrunk",
                        week.days[day].weekday, category
                    ));
                }
            }

            let candidates = flavor::content_candidates(rankings, &week.days[day].flavor);
            self.assign_content(&mut week.days[day], &candidates);

            debug!(
                day = %week.days[day].weekday,
                strategy = %strategy,
                target,
                placed = week.days[day].slots.len(),
                "Allocated day"
            );
        }

        warnings.extend(self.rebalance(&mut week));

        info!(
            creator = %creator.id,
            total = week.total(),
            unique_types = week.weekly_counts().len(),
            "Weekly allocation complete"
        );
        Ok(Resolved {
            value: week,
            warnings,
        })
    }

    /// Place one slot of `category`, spilling to engagement then revenue
    fn place(&self, week: &mut WeeklyAllocation, day: usize, category: Category) -> bool {
        let mut fallbacks = vec![category];
        for spill in [Category::Engagement, Category::Revenue] {
            if !fallbacks.contains(&spill) {
                fallbacks.push(spill);
            }
        }

        for category in fallbacks {
            if let Some(send_type) = self.choose(week, day, category) {
                let slot = AllocationSlot {
                    send_type: send_type.key.clone(),
                    category: send_type.category,
                    content_type: None,
                };
                let day_alloc = &mut week.days[day];
                match send_type.is_followup() {
                    true => match day_alloc.unfollowed_parent(self.catalog) {
                        Some(parent) => day_alloc.slots.insert(parent + 1, slot),
                        None => continue,
                    },
                    false => day_alloc.slots.push(slot),
                }
                return true;
            }
        }
        false
    }

    /// Least-used legal type of `category`, avoiding a repeat of the previous slot
    pub(crate) fn choose(&self, week: &WeeklyAllocation, day: usize, category: Category) -> Option<&'a SendType> {
        let day_alloc = &week.days[day];
        let has_parent = day_alloc.unfollowed_parent(self.catalog).is_some();
        let last = day_alloc.slots.last().map(|s| s.send_type.as_str());
        let len = self.catalog.len().max(1);

        self.catalog
            .eligible_in(week.page_type, category)
            .into_iter()
            .filter(|t| week.can_place(t, day))
            .filter(|t| !t.is_followup() || has_parent)
            .min_by_key(|t| {
                let rotated = (self.catalog.position(&t.key) + len - (day * 3) % len) % len;
                (
                    week.weekly_count(&t.key),
                    last == Some(t.key.as_str()),
                    day_alloc.count_of(&t.key),
                    rotated,
                )
            })
    }

    /// Give media-bearing slots a content type, cycling through the candidates
    fn assign_content(&self, day: &mut DayAllocation, candidates: &[String]) {
        if candidates.is_empty() {
            return;
        }
        let mut revenue_cursor = 0;
        let mut other_cursor = 1;
        for slot in &mut day.slots {
            let needs_media = self
                .catalog
                .get(&slot.send_type)
                .is_some_and(|t| t.requires_media);
            if !needs_media {
                continue;
            }
            let cursor = match slot.category {
                Category::Revenue => &mut revenue_cursor,
                _ => &mut other_cursor,
            };
            slot.content_type = Some(candidates[*cursor % candidates.len()].clone());
            *cursor += 1;
        }
    }

    /// Convert slots in place until the weekly category mix is within bounds
    fn rebalance(&self, week: &mut WeeklyAllocation) -> Vec<String> {
        let mut warnings = Vec::new();
        let total = week.total() as f64;
        if total == 0.0 {
            return warnings;
        }
        let share = |week: &WeeklyAllocation, c: Category| week.category_total(c) as f64 / total;

        while share(week, Category::Retention) > RETENTION_CEILING {
            if !self.convert(week, Category::Retention, Category::Engagement) {
                break;
            }
        }
        while share(week, Category::Engagement) < ENGAGEMENT_FLOOR
            && (week.category_total(Category::Revenue) as f64 - 1.0) / total >= REVENUE_FLOOR
        {
            if !self.convert(week, Category::Revenue, Category::Engagement) {
                break;
            }
        }
        while share(week, Category::Revenue) < REVENUE_FLOOR {
            if !self.convert(week, Category::Engagement, Category::Revenue) {
                break;
            }
        }

        for (category, ok) in [
            (Category::Revenue, share(week, Category::Revenue) >= REVENUE_FLOOR),
            (Category::Engagement, share(week, Category::Engagement) >= ENGAGEMENT_FLOOR),
            (Category::Retention, share(week, Category::Retention) <= RETENTION_CEILING),
        ] {
            if !ok {
                warn!(category = %category, share = share(week, category), "Weekly category mix out of bounds");
                warnings.push(format!(
                    "ADVISORY: weekly {} share {:.0}% outside bounds after rebalance",
                    category,
                    share(week, category) * 100.0
                ));
            }
        }
        warnings
    }

    /// Turn one `from` slot into a `to` slot on the day richest in `from`
    fn convert(&self, week: &mut WeeklyAllocation, from: Category, to: Category) -> bool {
        let mut days: Vec<usize> = (0..week.days.len()).collect();
        days.sort_by_key(|&d| {
            let n = week.days[d].slots.iter().filter(|s| s.category == from).count();
            std::cmp::Reverse(n)
        });

        for day in days {
            let Some(pos) = (0..week.days[day].slots.len()).rev().find(|&p| {
                let d = &week.days[day];
                d.slots[p].category == from && !d.is_load_bearing(p, self.catalog)
            }) else {
                continue;
            };

            let removed = week.days[day].slots.remove(pos);
            match self.choose(week, day, to).filter(|t| !t.is_followup()) {
                Some(t) => {
                    week.days[day].slots.insert(
                        pos,
                        AllocationSlot {
                            send_type: t.key.clone(),
                            category: t.category,
                            content_type: removed.content_type.clone().filter(|_| t.requires_media),
                        },
                    );
                    debug!(day, from = %from, to = %to, send_type = %t.key, "Converted slot");
                    return true;
                }
                None => week.days[day].slots.insert(pos, removed),
            }
        }
        false
    }
}
