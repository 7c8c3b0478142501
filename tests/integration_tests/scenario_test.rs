//! Reference scenarios for consensus, pricing and run repair

use chrono::{NaiveDate, Weekday};

use sendplan::allocation::{AllocationSlot, DailyStrategy, DayAllocation, DayFlavor};
use sendplan::catalog::{PriceBounds, SendTypeCatalog};
use sendplan::config::{PricingSettings, ValidationSettings};
use sendplan::diversity::break_runs;
use sendplan::diversity::repair::longest_run;
use sendplan::models::{Category, ContentTier};
use sendplan::pricing::{round_price_point, PricingContext, PricingOptimizer};
use sendplan::validation::{combine, ConsensusKind, ScorerReport, ValidationVerdict, VerdictStatus};

fn consensus(compliance: f64, strategic: f64) -> ValidationVerdict {
    let settings = ValidationSettings::default();
    combine(
        ScorerReport::from_score("compliance", compliance, &settings.compliance),
        ScorerReport::from_score("strategic", strategic, &settings.strategic),
        &settings,
    )
}

// ============================================================================
// Consensus
// ============================================================================

#[test]
fn test_consensus_full_agreement() {
    let v = consensus(92.0, 88.0);
    assert_eq!(v.status, VerdictStatus::Approved);
    assert_eq!(v.consensus, ConsensusKind::FullConsensus);
}

#[test]
fn test_consensus_divergence_requires_review() {
    let v = consensus(92.0, 72.0);
    assert_eq!(v.divergence, 20.0);
    assert_eq!(v.consensus, ConsensusKind::RequiresReview);
    assert!(v.manual_reconciliation);
    assert_ne!(v.status, VerdictStatus::Approved);
}

#[test]
fn test_consensus_hard_floor_rejects() {
    for (a, b) in [(40.0, 95.0), (95.0, 40.0)] {
        let v = consensus(a, b);
        assert_eq!(v.status, VerdictStatus::Rejected);
        assert_eq!(v.consensus, ConsensusKind::HardRejection);
    }
}

#[test]
fn test_verdict_status_wire_format() {
    let json = serde_json::to_string(&VerdictStatus::NeedsReview).unwrap();
    assert_eq!(json, "\"NEEDS_REVIEW\"");
}

// ============================================================================
// Pricing
// ============================================================================

#[test]
fn test_reference_price() {
    let catalog = SendTypeCatalog::default();
    let optimizer = PricingOptimizer::new(&catalog, PricingSettings::default());
    let ctx = PricingContext {
        creator_tier: 3,
        saturation: 20.0,
        confidence: 0.9,
        purchase_rate: 0.05,
    };
    let bounds = PriceBounds {
        default: 12.0,
        floor: 5.0,
        ceiling: 100.0,
    };

    let quote = optimizer.quote(&bounds, ContentTier::Top, Weekday::Thu, &ctx).unwrap();
    assert!((quote.raw - 20.592).abs() < 1e-6);
    assert_eq!(quote.price, 20.0);
    assert!(quote.price >= bounds.floor && quote.price <= bounds.ceiling);
}

#[test]
fn test_price_point_rounding() {
    assert_eq!(round_price_point(53.0, 20.0, 50.0), 50.0);
    assert_eq!(round_price_point(48.0, 20.0, 50.0), 50.0);
    assert_eq!(round_price_point(44.0, 20.0, 50.0), 45.0);
    assert_eq!(round_price_point(19.4, 20.0, 50.0), 19.0);
    assert_eq!(round_price_point(74.0, 20.0, 50.0), 70.0);
}

// ============================================================================
// Run Repair
// ============================================================================

fn slot(key: &str, category: Category) -> AllocationSlot {
    AllocationSlot {
        send_type: key.to_string(),
        category,
        content_type: None,
    }
}

#[test]
fn test_three_in_a_row_is_broken() {
    let catalog = SendTypeCatalog::default();
    let mut day = DayAllocation {
        date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
        weekday: Weekday::Tue,
        strategy: DailyStrategy::Balanced,
        flavor: DayFlavor {
            emphasis: "solo".to_string(),
            avoid: "feet".to_string(),
        },
        slots: vec![
            slot("ppv_unlock", Category::Revenue),
            slot("bump_normal", Category::Engagement),
            slot("bump_normal", Category::Engagement),
            slot("bump_normal", Category::Engagement),
            slot("link_drop", Category::Engagement),
            slot("bundle", Category::Revenue),
        ],
    };

    let swaps = break_runs(&mut day, &catalog, 2);
    assert!(swaps >= 1);
    assert!(longest_run(&day).map_or(0, |(_, n)| n) <= 2);
    assert_eq!(day.count_of("bump_normal"), 3);
    assert_eq!(day.slots.len(), 6);
}
