//! End-to-end pipeline integration tests
//!
//! Runs the full planning pipeline over in-memory contexts and checks the
//! released schedule against the planning rules.

use std::collections::{BTreeMap, HashMap};

use sendplan::catalog::SendTypeCatalog;
use sendplan::config::PlannerConfig;
use sendplan::models::{Category, PageType};
use sendplan::pipeline::{PipelineOutcome, SchedulePipeline};
use sendplan::validation::VerdictStatus;

use crate::common::{context, day_minutes, week_start};

async fn run(id: &str, tier: u8, page_type: PageType, config: PlannerConfig) -> PipelineOutcome {
    SchedulePipeline::new(config)
        .run(&context(id, tier, page_type), id, week_start())
        .await
        .unwrap()
}

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_paid_creator_week_is_released() {
    let outcome = run("paid-3", 3, PageType::Paid, PlannerConfig::default()).await;

    assert_ne!(outcome.verdict.status, VerdictStatus::Rejected, "{:?}", outcome.verdict.issues);
    let schedule = outcome.schedule.expect("released schedule");
    assert_eq!(schedule.days.len(), 7);
    assert!(schedule.items.iter().all(|i| i.time.is_some()));

    let volume = outcome.volume.unwrap();
    assert!(schedule.items.len() as u32 <= volume.weekly_total());
}

#[tokio::test]
async fn test_released_schedule_meets_diversity_floors() {
    let outcome = run("paid-4", 4, PageType::Paid, PlannerConfig::default()).await;
    let schedule = outcome.schedule.expect("released schedule");

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in &schedule.items {
        *counts.entry(item.send_type.as_str()).or_insert(0) += 1;
    }
    let total = schedule.items.len() as f64;
    assert!(counts.len() >= 10, "only {} unique types", counts.len());
    for (key, n) in &counts {
        assert!(*n as f64 / total <= 0.20, "{key} is over 20%");
    }
}

#[tokio::test]
async fn test_released_schedule_spacing() {
    let outcome = run("paid-3b", 3, PageType::Paid, PlannerConfig::default()).await;
    let schedule = outcome.schedule.expect("released schedule");

    for day in &schedule.days {
        let minutes = day_minutes(&schedule, day.date);
        for pair in minutes.windows(2) {
            assert!(pair[1] - pair[0] >= 45, "{} gap {}", day.weekday, pair[1] - pair[0]);
        }
        assert!(minutes.iter().all(|m| m % 15 != 0));
    }
}

#[tokio::test]
async fn test_followups_and_prices() {
    let catalog = SendTypeCatalog::default();
    let outcome = run("paid-4b", 4, PageType::Paid, PlannerConfig::default()).await;
    let schedule = outcome.schedule.expect("released schedule");

    for item in &schedule.items {
        let send_type = catalog.get(&item.send_type).unwrap();
        if let Some(pid) = item.parent_item_id {
            let parent = schedule.item(pid).unwrap();
            assert_eq!(parent.date, item.date);
            assert!(parent.time.unwrap() < item.time.unwrap());
        }
        if item.category == Category::Revenue {
            let bounds = send_type.price.unwrap();
            let price = item.price.expect("revenue item priced");
            assert!(price >= bounds.floor && price <= bounds.ceiling, "{} at {price}", item.send_type);
            assert!(item.price_rationale.is_some());
        } else {
            assert!(item.price.is_none());
        }
        if send_type.requires_media {
            assert!(item.content_type.is_some(), "{} without content", item.send_type);
        }
    }

    let pricing = outcome.pricing.unwrap();
    let revenue_items = schedule.items.iter().filter(|i| i.category == Category::Revenue).count();
    assert_eq!(pricing.priced_items, revenue_items);
    assert!(pricing.lower_bound <= pricing.total_projected_revenue);
    assert!(pricing.total_projected_revenue <= pricing.upper_bound);
}

#[tokio::test]
async fn test_free_page_never_gets_paid_types() {
    let catalog = SendTypeCatalog::default();
    let outcome = run("free-2", 2, PageType::Free, PlannerConfig::default()).await;
    let schedule = outcome.schedule.expect("released schedule");

    for item in &schedule.items {
        assert!(catalog.get(&item.send_type).unwrap().allowed_on(PageType::Free), "{}", item.send_type);
    }
}

#[tokio::test]
async fn test_fixed_seed_is_deterministic() {
    let mut config = PlannerConfig::default();
    config.timing.seed = Some(7);

    let first = run("det-1", 3, PageType::Paid, config.clone()).await;
    let second = run("det-1", 3, PageType::Paid, config).await;

    assert_eq!(first.schedule, second.schedule);
    assert_eq!(first.pricing, second.pricing);
    assert_eq!(first.verdict.score, second.verdict.score);
}

#[tokio::test]
async fn test_outcome_round_trips_as_json() {
    let outcome = run("json-1", 2, PageType::Paid, PlannerConfig::default()).await;
    let json = serde_json::to_string(&outcome).unwrap();
    let parsed: PipelineOutcome = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.schedule, outcome.schedule);
    assert_eq!(parsed.verdict.status, outcome.verdict.status);
    assert!(json.contains("\"status\":\""));
}

#[tokio::test]
async fn test_summary_matches_items() {
    let outcome = run("summary-1", 3, PageType::Free, PlannerConfig::default()).await;
    let schedule = outcome.schedule.expect("released schedule");
    let summary = schedule.summary();

    assert_eq!(summary.total_items, schedule.items.len());
    let by_category: HashMap<Category, usize> = summary.by_category;
    assert_eq!(by_category.values().sum::<usize>(), schedule.items.len());
    assert_eq!(summary.by_type.values().sum::<usize>(), schedule.items.len());
}
